use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use log::{debug, trace};
use std::io;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

enum AlarmCommand {
    Schedule(Instant),
    Cancel,
    Shutdown,
}

/// Background timer that invokes a callback once per scheduled deadline
///
/// One thread serves one alarm. Scheduling while a deadline is pending keeps the
/// earlier of the two. Dropping the alarm stops and joins the thread, so the
/// callback never runs after its owner is gone.
pub struct Alarm {
    name: String,
    sender: Sender<AlarmCommand>,
    handle: Option<JoinHandle<()>>,
}

impl Alarm {
    /// Spawn the timer thread
    pub fn spawn<F>(name: impl Into<String>, on_fire: F) -> io::Result<Self>
    where
        F: Fn() + Send + 'static,
    {
        let name = name.into();
        let (sender, receiver) = unbounded();
        let thread_name = format!("alarm-{}", name);
        let handle = thread::Builder::new()
            .name(thread_name)
            .spawn(move || Self::run(receiver, on_fire))?;

        Ok(Self {
            name,
            sender,
            handle: Some(handle),
        })
    }

    fn run<F: Fn()>(receiver: Receiver<AlarmCommand>, on_fire: F) {
        let mut pending: Option<Instant> = None;
        loop {
            let command = match pending {
                Some(deadline) => receiver.recv_deadline(deadline),
                None => receiver
                    .recv()
                    .map_err(|_| RecvTimeoutError::Disconnected),
            };

            match command {
                Ok(AlarmCommand::Schedule(deadline)) => {
                    pending = Some(pending.map_or(deadline, |current| current.min(deadline)));
                }
                Ok(AlarmCommand::Cancel) => pending = None,
                Ok(AlarmCommand::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {
                    pending = None;
                    trace!("Alarm fired");
                    on_fire();
                }
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fire at `deadline` (immediately if it has already passed)
    pub fn schedule_at(&self, deadline: Instant) {
        let _ = self.sender.send(AlarmCommand::Schedule(deadline));
    }

    /// Fire after `delay`
    pub fn schedule_after(&self, delay: Duration) {
        self.schedule_at(Instant::now() + delay);
    }

    /// Drop the pending deadline, if any
    pub fn cancel(&self) {
        let _ = self.sender.send(AlarmCommand::Cancel);
    }
}

impl Drop for Alarm {
    fn drop(&mut self) {
        let _ = self.sender.send(AlarmCommand::Shutdown);
        if let Some(handle) = self.handle.take() {
            // Joining our own thread would deadlock (callback dropping the last owner)
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
        debug!("Alarm {} stopped", self.name);
    }
}
