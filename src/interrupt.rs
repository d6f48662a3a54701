//! Ctrl-C handling.
//!
//! An interrupt ends the run while the broker itself is working or showing a
//! plain prompt. During a hidden prompt it is only recorded, so the terminal
//! gets its echo back before the prompt reports the abort. While a launched
//! command runs it belongs to the child and the broker ignores it.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Once;

static INSTALL: Once = Once::new();
static INTERRUPTED: AtomicBool = AtomicBool::new(false);
static HIDDEN_PROMPTS: AtomicUsize = AtomicUsize::new(0);
static RUNNING_CHILDREN: AtomicUsize = AtomicUsize::new(0);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Ignore,
    Record,
    Exit,
}

/// What an interrupt does given the work in progress.
pub fn action(running_children: usize, hidden_prompts: usize) -> Action {
    if running_children > 0 {
        Action::Ignore
    } else if hidden_prompts > 0 {
        Action::Record
    } else {
        Action::Exit
    }
}

/// Installs the process-wide handler. Later calls do nothing.
pub fn install() {
    INSTALL.call_once(|| {
        if let Err(e) = ctrlc::set_handler(on_interrupt) {
            log::debug!("could not install interrupt handler: {}", e);
        }
    });
}

fn on_interrupt() {
    let running_children = RUNNING_CHILDREN.load(Ordering::SeqCst);
    let hidden_prompts = HIDDEN_PROMPTS.load(Ordering::SeqCst);
    match action(running_children, hidden_prompts) {
        Action::Ignore => log::debug!("interrupt left to the running command"),
        Action::Record => record(),
        Action::Exit => {
            eprintln!();
            eprintln!("Aborted.");
            std::process::exit(130);
        }
    }
}

pub(crate) fn record() {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

/// True once after an interrupt was recorded.
pub fn take() -> bool {
    INTERRUPTED.swap(false, Ordering::SeqCst)
}

/// Counts one unit of work for as long as it is alive.
pub struct Guard {
    counter: &'static AtomicUsize,
}

impl Guard {
    fn enter(counter: &'static AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Guard { counter }
    }
}

impl Drop for Guard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Held while a hidden prompt owns the terminal.
pub fn hidden_prompt() -> Guard {
    Guard::enter(&HIDDEN_PROMPTS)
}

/// Held while a launched command runs.
pub fn child_running() -> Guard {
    Guard::enter(&RUNNING_CHILDREN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_owns_interrupts() {
        assert_eq!(action(1, 0), Action::Ignore);
        assert_eq!(action(1, 1), Action::Ignore);
    }

    #[test]
    fn hidden_prompt_defers_abort() {
        assert_eq!(action(0, 1), Action::Record);
        assert_eq!(action(0, 0), Action::Exit);
    }

    #[test]
    fn guard_counts_while_alive() {
        static COUNTER: AtomicUsize = AtomicUsize::new(0);
        {
            let _outer = Guard::enter(&COUNTER);
            let _inner = Guard::enter(&COUNTER);
            assert_eq!(COUNTER.load(Ordering::SeqCst), 2);
        }
        assert_eq!(COUNTER.load(Ordering::SeqCst), 0);
    }
}
