use std::{
    fs::File,
    io::Read,
    path::{Path, PathBuf},
    rc::Rc,
};

/// `Source` represents some literal source code: a REPL entry, a file on
/// disk, or a test snippet. It's essentially a string with a path, the path
/// serving as the source's name. Sources without a real path point to
/// `./source`.
#[derive(Debug, PartialEq, Eq)]
pub struct Source {
    pub contents: String,
    pub path: PathBuf,
}

impl Source {
    /// Builds a new `Source` from an `&str` and a `Path`.
    pub fn new(contents: &str, path: &Path) -> Rc<Source> {
        Rc::new(Source { contents: contents.to_string(), path: path.to_owned() })
    }

    /// Reads a file from disk into a `Source`.
    pub fn path(path: &Path) -> std::io::Result<Rc<Source>> {
        let mut contents = String::new();
        let mut file = File::open(path)?;
        file.read_to_string(&mut contents)?;
        Ok(Source::new(&contents, path))
    }

    /// Builds a `Source` from a bare string, for the REPL and tests.
    /// Points at the placeholder path `./source`.
    pub fn source(contents: &str) -> Rc<Source> {
        Source::new(contents, &PathBuf::from("./source"))
    }
}
