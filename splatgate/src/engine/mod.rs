mod command;

pub use command::{CommandHandler, EngineRuntime, OUTPUT_FILENAME};
