pub mod commands;

pub use commands::serve::ServeCommand;
