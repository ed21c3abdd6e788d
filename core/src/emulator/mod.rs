pub mod comm;
pub mod config;
pub mod pacing;
#[cfg(feature = "savestates")]
pub mod save;
pub mod thread;

use std::time::{Duration, Instant};

use anyhow::Result;
use crossbeam_channel::{Receiver, Select, Sender};
use log::*;

use crate::amiga::Amiga;
use crate::amiga::chipset::SharedSnapshot;
use crate::amiga::control::RunLoopControl;
use crate::amiga::copper::CopperHit;
use crate::amiga::cpu::CpuCore;
use crate::bus::Address;
use crate::bus::chipram::ChipRam;
use crate::debuggable::Debuggable;
use crate::tickable::{Tickable, Ticks};

use comm::{
    EmulatorCommand, EmulatorCommandSender, EmulatorEvent, EmulatorEventReceiver, EmulatorStatus,
    ExecState, UserMessageType,
};
use config::{ConfigError, EmulatorConfig, EmulatorOption};
use pacing::Pacer;

/// Longest time the emulator blocks waiting for commands
const MAX_IDLE: Duration = Duration::from_millis(10);

/// Interval of status updates while running
const STATUS_INTERVAL: Duration = Duration::from_millis(500);

pub type EmulatedAmiga = Amiga<Box<dyn CpuCore + Send>, ChipRam>;

/// Emulator runner: paces frames, executes commands and reports events
pub struct Emulator {
    amiga: EmulatedAmiga,
    config: EmulatorConfig,
    command_sender: Sender<EmulatorCommand>,
    command_recv: Receiver<EmulatorCommand>,
    event_sender: Sender<EmulatorEvent>,
    event_recv: EmulatorEventReceiver,
    control: RunLoopControl,
    run: bool,
    pacer: Pacer,
    /// Pacing baseline is stale after the run loop was stopped from outside
    pacer_stale: bool,
    last_update: Instant,
    /// Last save state taken on request of the snapshot flag
    snapshot: Option<Vec<u8>>,
}

impl Emulator {
    pub fn new(cpu: Box<dyn CpuCore + Send>, config: EmulatorConfig) -> Result<Self> {
        config.validate()?;

        let mut amiga = Amiga::new(
            cpu,
            ChipRam::new(config.chip_ram),
            config.video_format,
            config.revision,
        );
        amiga.chipset.agnus.arbiter.set_debugger(config.dma_debug);
        amiga
            .chipset
            .set_inspection_interval(config.inspection_ticks());
        let control = amiga.chipset.control().clone();

        let now = Instant::now();
        let mut pacer = Pacer::new(now, config.video_format.refresh_rate(), config.speed);
        pacer.set_warp(now, config.warp);

        let (command_sender, command_recv) = crossbeam_channel::unbounded();
        let (event_sender, event_recv) = crossbeam_channel::unbounded();

        info!(
            "Emulator created: {} {}, {} KB chip RAM",
            config.video_format,
            config.revision,
            config.chip_ram / 1024
        );

        Ok(Self {
            amiga,
            config,
            command_sender,
            command_recv,
            event_sender,
            event_recv,
            control,
            run: false,
            pacer,
            pacer_stale: false,
            last_update: now,
            snapshot: None,
        })
    }

    pub fn create_cmd_sender(&self) -> EmulatorCommandSender {
        self.command_sender.clone()
    }

    pub fn create_event_recv(&self) -> EmulatorEventReceiver {
        self.event_recv.clone()
    }

    /// Run loop flags of the emulated machine
    pub fn control(&self) -> RunLoopControl {
        self.control.clone()
    }

    pub fn inspection(&self) -> SharedSnapshot {
        self.amiga.chipset.inspection()
    }

    pub fn amiga(&self) -> &EmulatedAmiga {
        &self.amiga
    }

    pub fn amiga_mut(&mut self) -> &mut EmulatedAmiga {
        &mut self.amiga
    }

    pub fn config(&self) -> &EmulatorConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.run
    }

    /// Applies a runtime option. Nothing changes if the option is invalid.
    pub fn set_option(&mut self, option: EmulatorOption) -> Result<(), ConfigError> {
        option.validate(self.config.chip_ram)?;

        let now = Instant::now();
        let chipset = &mut self.amiga.chipset;
        match option {
            EmulatorOption::VideoFormat(format) => {
                self.config.video_format = format;
                chipset.agnus.set_video_format(format);
                chipset.set_inspection_interval(self.config.inspection_ticks());
                self.pacer
                    .set_rate(now, format.refresh_rate(), self.config.speed);
            }
            EmulatorOption::AgnusRevision(revision) => {
                self.config.revision = revision;
                chipset.agnus.set_revision(revision);
            }
            EmulatorOption::DmaDebug(v) => {
                self.config.dma_debug = v;
                chipset.agnus.arbiter.set_debugger(v);
            }
            EmulatorOption::WarpMode(v) => {
                self.config.warp = v;
                self.pacer.set_warp(now, v);
            }
            EmulatorOption::Speed(speed) => {
                self.config.speed = speed;
                self.pacer
                    .set_rate(now, self.config.video_format.refresh_rate(), speed);
            }
            EmulatorOption::InspectionInterval(ms) => {
                self.config.inspection_interval = ms;
                chipset.set_inspection_interval(self.config.inspection_ticks());
            }
            EmulatorOption::AddCopperBreakpoint(addr) => chipset.copper.set_breakpoint(addr),
            EmulatorOption::RemoveCopperBreakpoint(addr) => chipset.copper.clear_breakpoint(addr),
            EmulatorOption::AddCopperWatchpoint(reg) => chipset.copper.set_watchpoint(reg),
            EmulatorOption::RemoveCopperWatchpoint(reg) => chipset.copper.clear_watchpoint(reg),
        }
        info!("Option set: {:?}", option);
        Ok(())
    }

    /// Writes a save state of the chipset to the given writer
    #[cfg(feature = "savestates")]
    pub fn save_state<W: std::io::Write + std::io::Seek>(&self, writer: W) -> Result<()> {
        save::save_state_to(writer, &self.amiga.chipset)
    }

    /// Replaces the chipset by a save state. The CPU keeps its state.
    #[cfg(feature = "savestates")]
    pub fn load_state<R: std::io::Read + std::io::Seek>(&mut self, reader: R) -> Result<()> {
        let mut chipset = save::load_state_from(reader)?;
        chipset.attach(self.control.clone(), self.amiga.chipset.inspection());

        self.config.chip_ram = chipset.mem.size();
        self.config.video_format = chipset.agnus.frame().format;
        self.config.revision = chipset.agnus.revision();
        self.config.dma_debug = chipset.agnus.arbiter.debugger_enabled();
        self.amiga.chipset = chipset;
        self.pacer.set_rate(
            Instant::now(),
            self.config.video_format.refresh_rate(),
            self.config.speed,
        );
        self.amiga.chipset.inspect();
        self.status_update()
    }

    /// Returns the last state saved on request of the snapshot flag
    pub fn take_snapshot(&mut self) -> Option<Vec<u8>> {
        self.snapshot.take()
    }

    #[cfg(feature = "savestates")]
    fn save_snapshot(&mut self) {
        let mut buf = std::io::Cursor::new(vec![]);
        match self.save_state(&mut buf) {
            Ok(()) => self.snapshot = Some(buf.into_inner()),
            Err(e) => self.user_error(&format!("Cannot save snapshot: {:#}", e)),
        }
    }

    #[cfg(not(feature = "savestates"))]
    fn save_snapshot(&mut self) {
        self.user_warning("Snapshots require the savestates feature");
    }

    fn status_update(&mut self) -> Result<()> {
        let chipset = &self.amiga.chipset;
        let copper = &chipset.copper;
        self.event_sender
            .send(EmulatorEvent::Status(Box::new(EmulatorStatus {
                state: if self.run {
                    ExecState::Running
                } else {
                    ExecState::Paused
                },
                clock: chipset.clock(),
                frame: chipset.agnus.frame().nr,
                beam: chipset.agnus.pos(),
                copper_pc: copper.pc(),
                copper_breakpoints: copper.breakpoints().to_vec(),
                copper_watchpoints: copper
                    .watchpoints()
                    .iter()
                    .map(|&r| Address::from(r))
                    .collect(),
                speed: self.config.speed,
                warp: self.pacer.warp(),
                resyncs: self.pacer.resyncs(),
            })))?;

        if self.config.dma_debug {
            self.event_sender.send(EmulatorEvent::DebugProperties(
                chipset.get_debug_properties(),
            ))?;
        }
        Ok(())
    }

    fn set_running(&mut self, run: bool) -> Result<()> {
        if self.run != run {
            self.run = run;
            self.pacer.reset(Instant::now());
            let state = if run {
                ExecState::Running
            } else {
                ExecState::Paused
            };
            info!("Emulator {}", state);
            self.event_sender
                .send(EmulatorEvent::PowerStateChanged(state))?;
        }
        self.status_update()
    }

    fn user_message(&self, kind: UserMessageType, msg: &str) {
        match kind {
            UserMessageType::Error => error!("{}", msg),
            UserMessageType::Warning => warn!("{}", msg),
            UserMessageType::Notice | UserMessageType::Success => info!("{}", msg),
        }
        if self
            .event_sender
            .send(EmulatorEvent::UserMessage(kind, msg.to_owned()))
            .is_err()
        {
            debug!("No listeners for user message");
        }
    }

    fn user_error(&self, msg: &str) {
        self.user_message(UserMessageType::Error, msg);
    }

    #[cfg_attr(feature = "savestates", allow(dead_code))]
    fn user_warning(&self, msg: &str) {
        self.user_message(UserMessageType::Warning, msg);
    }

    fn user_notice(&self, msg: &str) {
        self.user_message(UserMessageType::Notice, msg);
    }

    /// Stops the machine after an error of the CPU execution unit
    fn halt(&mut self, e: anyhow::Error) -> Result<()> {
        self.user_error(&format!(
            "Emulator halted: CPU error at clock {}: {:#}",
            self.amiga.clock(),
            e
        ));
        self.set_running(false)
    }

    fn step(&mut self) -> Result<()> {
        if let Err(e) = self.amiga.step() {
            return self.halt(e);
        }
        self.handle_flags()?;
        self.status_update()
    }

    /// Runs until the frame in progress completed. Returns false if the run
    /// loop should be left.
    fn run_frame(&mut self) -> Result<bool> {
        if let Err(e) = self.amiga.run_frame() {
            self.halt(e)?;
            return Ok(false);
        }

        if self.amiga.chipset.agnus.frame_completed() {
            self.pacer.frame_done();
            self.event_sender
                .send(EmulatorEvent::FrameCompleted(self.amiga.chipset.agnus.frame().nr))?;
        }
        self.handle_flags()
    }

    /// Services raised run loop flags. The stop flag is owned by whoever
    /// raised it and stays raised.
    fn handle_flags(&mut self) -> Result<bool> {
        let flags = self.control.get();
        if !flags.any() {
            return Ok(self.run);
        }
        self.control.clear(flags.with_stop(false));

        if flags.breakpoint() || flags.watchpoint() {
            self.set_running(false)?;
            match self.amiga.chipset.copper.take_hit() {
                Some(CopperHit::Breakpoint(addr)) => {
                    info!("Copper breakpoint reached at {:06X}", addr);
                    self.event_sender
                        .send(EmulatorEvent::BreakpointReached(addr))?;
                }
                Some(CopperHit::Watchpoint(reg)) => {
                    info!("Copper watchpoint reached: {:03X}", reg);
                    self.event_sender
                        .send(EmulatorEvent::WatchpointReached(Address::from(reg)))?;
                }
                None => (),
            }
        }
        if flags.inspect() {
            self.amiga.chipset.inspect();
        }
        if flags.snapshot() {
            self.save_snapshot();
        }
        if flags.stop() {
            self.pacer_stale = true;
            return Ok(false);
        }
        Ok(self.run)
    }

    /// Blocks until a command arrives or the timeout expires
    fn wait_for_command(&self, timeout: Duration) {
        let mut sel = Select::new();
        sel.recv(&self.command_recv);
        let _ = sel.ready_timeout(timeout);
    }

    /// Executes a command. Returns false when the emulator should terminate.
    fn handle_command(&mut self, cmd: EmulatorCommand) -> Result<bool> {
        match cmd {
            EmulatorCommand::Quit => {
                info!("Emulator terminating");
                self.run = false;
                self.event_sender
                    .send(EmulatorEvent::PowerStateChanged(ExecState::Off))?;
                return Ok(false);
            }
            EmulatorCommand::Run => self.set_running(true)?,
            EmulatorCommand::Stop => self.set_running(false)?,
            EmulatorCommand::Step => {
                if self.run {
                    warn!("Cannot step while running");
                } else {
                    self.step()?;
                }
            }
            EmulatorCommand::Reset => {
                self.amiga.reset();
                self.pacer.reset(Instant::now());
                self.user_notice("Machine reset");
                self.status_update()?;
            }
            EmulatorCommand::Inspect => self.amiga.chipset.inspect(),
            EmulatorCommand::Status => self.status_update()?,
        }
        Ok(true)
    }
}

impl Tickable for Emulator {
    fn tick(&mut self, ticks: Ticks) -> Result<Ticks> {
        while let Ok(cmd) = self.command_recv.try_recv() {
            if !self.handle_command(cmd)? {
                return Ok(0);
            }
        }

        if !self.run {
            self.wait_for_command(MAX_IDLE);
            return Ok(ticks);
        }

        if self.pacer_stale && !self.control.get().stop() {
            self.pacer_stale = false;
            self.pacer.reset(Instant::now());
        }

        if self.last_update.elapsed() > STATUS_INTERVAL {
            self.last_update = Instant::now();
            self.status_update()?;
        }

        let due = self.pacer.frames_due(Instant::now());
        for _ in 0..due {
            if !self.run_frame()? {
                return Ok(ticks);
            }
        }

        let sleep = self.pacer.sleep_time(Instant::now());
        if !sleep.is_zero() {
            self.wait_for_command(sleep.min(MAX_IDLE));
        }
        Ok(ticks)
    }
}
