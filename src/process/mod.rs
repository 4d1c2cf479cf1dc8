mod external_command;

pub use external_command::{CommandError, ExternalCommand};
