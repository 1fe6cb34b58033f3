use thiserror::Error;

#[derive(Error, Debug)]
pub enum ForgeError {
    #[error("a generation is already in flight")] Busy,
    #[error("invalid project file: {0}")] InvalidProject(String),
    #[error("chapter {0} does not exist; generate the outline first")] MissingChapter(usize),
    #[error("chapter {0} has no content yet")] EmptyChapter(usize),
    #[error("unknown field: {0}")] UnknownField(String),
    #[error("step {0} has no generation of its own")] NotGenerative(String),
}
