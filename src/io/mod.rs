//! Classpath entries and output destinations on the local filesystem.

mod format;
mod sink;
mod source;

pub use format::{
    empty_file_sink, DefaultFileCanonicalizer, FileCanonicalizer, FileFormat, FileFormatDetector,
    FileSinkFactory, FileSourceFactory, IoFactory,
};
pub use sink::{DirectoryFileSink, EmptyFileSink, FileSink, JarFileSink, UpdatingJarFileSink};
pub use source::{DirectoryFileSource, EmptyFileSource, EntryType, FileSource, JarFileSource};
