use std::fs::File;
use std::io::Read;
use std::path::Path;

pub(crate) fn read_file<P: AsRef<Path>>(path: P) -> std::io::Result<String> {
    let mut buf = String::new();
    let mut file = File::open(&path)?;
    file.read_to_string(&mut buf)?;
    Ok(buf)
}

pub(crate) fn file_exists(path: &Path) -> bool {
    path.is_file()
}
