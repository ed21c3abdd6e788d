pub mod amiga;
pub mod bus;
pub mod debuggable;
pub mod emulator;
pub mod scheduler;
pub mod tickable;
pub mod types;
