mod path_ext;

pub use path_ext::{BestEffortPathExt, RelativePathError, relative_slash_path};
