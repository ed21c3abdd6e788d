//! Emulator thread with suspend/resume

use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use anyhow::{Result, anyhow};
use log::*;

use super::Emulator;
use super::comm::{EmulatorCommand, EmulatorCommandSender};
use super::config::EmulatorOption;
use crate::amiga::chipset::SharedSnapshot;
use crate::amiga::control::{RunLoopControl, RunLoopFlags};
use crate::tickable::Tickable;

#[derive(Debug, Default)]
struct ThreadState {
    /// Suspension nesting count
    suspend: usize,
    /// Thread waits for the suspension to end
    parked: bool,
    /// Thread ended
    exited: bool,
}

#[derive(Default)]
struct Shared {
    state: Mutex<ThreadState>,
    cond: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, ThreadState> {
        // The state holds plain counters, so it is usable after a panic.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Runs an [`Emulator`] on its own thread
pub struct EmulatorThread {
    emulator: Arc<Mutex<Emulator>>,
    shared: Arc<Shared>,
    control: RunLoopControl,
    inspection: SharedSnapshot,
    command_sender: EmulatorCommandSender,
    handle: Option<JoinHandle<Result<()>>>,
}

impl EmulatorThread {
    pub fn spawn(emulator: Emulator) -> Result<Self> {
        let control = emulator.control();
        let inspection = emulator.inspection();
        let command_sender = emulator.create_cmd_sender();
        let emulator = Arc::new(Mutex::new(emulator));
        let shared = Arc::new(Shared::default());

        let handle = thread::Builder::new().name("emulator".to_owned()).spawn({
            let emulator = Arc::clone(&emulator);
            let shared = Arc::clone(&shared);
            move || {
                let result = Self::run_loop(&emulator, &shared);
                if let Err(e) = &result {
                    error!("Emulator thread failed: {:#}", e);
                }
                shared.lock().exited = true;
                shared.cond.notify_all();
                result
            }
        })?;

        Ok(Self {
            emulator,
            shared,
            control,
            inspection,
            command_sender,
            handle: Some(handle),
        })
    }

    fn run_loop(emulator: &Mutex<Emulator>, shared: &Shared) -> Result<()> {
        loop {
            {
                let mut state = shared.lock();
                while state.suspend > 0 {
                    state.parked = true;
                    shared.cond.notify_all();
                    state = shared
                        .cond
                        .wait(state)
                        .unwrap_or_else(|e| e.into_inner());
                }
                state.parked = false;
            }

            let mut emu = emulator
                .lock()
                .map_err(|_| anyhow!("Emulator state poisoned"))?;
            if emu.tick(1)? == 0 {
                return Ok(());
            }
        }
    }

    /// Starts emulation
    pub fn run(&self) -> Result<()> {
        Ok(self.command_sender.send(EmulatorCommand::Run)?)
    }

    /// Stops emulation
    pub fn pause(&self) -> Result<()> {
        Ok(self.command_sender.send(EmulatorCommand::Stop)?)
    }

    pub fn command_sender(&self) -> EmulatorCommandSender {
        self.command_sender.clone()
    }

    pub fn control(&self) -> &RunLoopControl {
        &self.control
    }

    pub fn inspection(&self) -> SharedSnapshot {
        Arc::clone(&self.inspection)
    }

    pub fn is_suspended(&self) -> bool {
        self.shared.lock().suspend > 0
    }

    /// True if emulation proceeds: not suspended and running
    pub fn is_running(&self) -> Result<bool> {
        if self.is_suspended() {
            return Ok(false);
        }
        Ok(self.lock_emulator()?.is_running())
    }

    fn lock_emulator(&self) -> Result<MutexGuard<'_, Emulator>> {
        self.emulator
            .lock()
            .map_err(|_| anyhow!("Emulator state poisoned"))
    }

    /// Parks the emulator thread and returns once it is parked. Emulation
    /// resumes when the last guard is dropped. Must not be called from the
    /// emulator thread itself.
    pub fn suspend(&self) -> Result<SuspendGuard<'_>> {
        let mut state = self.shared.lock();
        if state.exited {
            return Err(anyhow!("Emulator thread has exited"));
        }
        state.suspend += 1;
        if state.suspend == 1 {
            trace!("Suspending emulator");
            self.control.raise(RunLoopFlags::none().with_stop(true));
        }
        let guard = SuspendGuard { thread: self };
        while !state.parked && !state.exited {
            state = self
                .shared
                .cond
                .wait(state)
                .unwrap_or_else(|e| e.into_inner());
        }
        Ok(guard)
    }

    /// Sends the quit command and waits for the thread to end
    pub fn quit(mut self) -> Result<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        if self.command_sender.send(EmulatorCommand::Quit).is_err() {
            debug!("Emulator already stopped listening");
        }
        handle
            .join()
            .map_err(|_| anyhow!("Emulator thread panicked"))?
    }
}

impl Drop for EmulatorThread {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            error!("Emulator shutdown: {:#}", e);
        }
    }
}

/// Exclusive access to a suspended emulator
pub struct SuspendGuard<'a> {
    thread: &'a EmulatorThread,
}

impl SuspendGuard<'_> {
    pub fn lock(&self) -> Result<MutexGuard<'_, Emulator>> {
        self.thread.lock_emulator()
    }

    /// Applies a runtime option
    pub fn set_option(&self, option: EmulatorOption) -> Result<()> {
        Ok(self.lock()?.set_option(option)?)
    }
}

impl Drop for SuspendGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.thread.shared.lock();
        state.suspend -= 1;
        if state.suspend == 0 {
            trace!("Resuming emulator");
            self.thread
                .control
                .clear(RunLoopFlags::none().with_stop(true));
            self.thread.shared.cond.notify_all();
        }
    }
}
