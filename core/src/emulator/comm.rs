use serde::{Deserialize, Serialize};
use strum::Display;

use crate::amiga::beam::Beam;
use crate::bus::Address;
use crate::debuggable::DebuggableProperties;
use crate::tickable::Ticks;

pub type EmulatorCommandSender = crossbeam_channel::Sender<EmulatorCommand>;
pub type EmulatorEventReceiver = crossbeam_channel::Receiver<EmulatorEvent>;

/// A command that can be sent to the emulator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmulatorCommand {
    Quit,
    Run,
    Stop,
    /// Executes a single CPU instruction while stopped
    Step,
    Reset,
    /// Refreshes the inspection snapshot now
    Inspect,
    /// Requests a status update
    Status,
}

/// Execution state of the emulator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
pub enum ExecState {
    Paused,
    Running,
    /// Emulator thread ended
    Off,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserMessageType {
    Success,
    Notice,
    Warning,
    Error,
}

/// Structure with general emulator status
#[derive(Debug, Clone, PartialEq)]
pub struct EmulatorStatus {
    pub state: ExecState,
    pub clock: Ticks,
    pub frame: i64,
    pub beam: Beam,
    pub copper_pc: Address,
    pub copper_breakpoints: Vec<Address>,
    pub copper_watchpoints: Vec<Address>,
    pub speed: u16,
    pub warp: bool,
    /// Pacing baseline resets
    pub resyncs: u64,
}

/// A status message/event received from the emulator
#[derive(Debug)]
pub enum EmulatorEvent {
    PowerStateChanged(ExecState),
    /// Copper fetched an instruction at this address
    BreakpointReached(Address),
    /// Copper wrote to this register
    WatchpointReached(Address),
    FrameCompleted(i64),
    Status(Box<EmulatorStatus>),
    UserMessage(UserMessageType, String),
    DebugProperties(DebuggableProperties),
}
