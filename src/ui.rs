use std::io::{self, BufRead, Write};

use crate::error::{BrokerError, Result};
use crate::interrupt;
use crate::session::LoginCredentials;

pub trait UI {
    fn get_username_and_password(&self) -> Result<LoginCredentials>;

    fn get_mfa_code(&self, prompt: &str) -> Result<String>;

    fn info(&self, message: &str);

    fn error(&self, message: &str);
}

/// Terminal prompts on stdin/stderr.
pub struct StdUI;

impl StdUI {
    pub fn new() -> Self {
        interrupt::install();
        StdUI
    }
}

impl Default for StdUI {
    fn default() -> Self {
        Self::new()
    }
}

impl UI for StdUI {
    fn get_username_and_password(&self) -> Result<LoginCredentials> {
        let username = read_from_stdin("Username")?;
        let password = read_password_from_stdin("Password")?;
        Ok(LoginCredentials::new(username, password))
    }

    fn get_mfa_code(&self, prompt: &str) -> Result<String> {
        read_from_stdin(prompt)
    }

    fn info(&self, message: &str) {
        eprintln!("{}", message);
    }

    fn error(&self, message: &str) {
        eprintln!("{}", message);
    }
}

/// Prompts until a non-blank line arrives. End of input is an abort.
pub fn read_from_stdin(prompt: &str) -> Result<String> {
    let stdin = io::stdin();
    read_line_from(&mut stdin.lock(), &mut io::stderr(), prompt)
}

fn read_line_from(input: &mut impl BufRead, output: &mut impl Write, prompt: &str) -> Result<String> {
    let mut text = String::new();
    while text.trim().is_empty() {
        write!(output, "{}: ", prompt)?;
        output.flush()?;
        text.clear();
        match input.read_line(&mut text) {
            Ok(0) => return Err(BrokerError::Aborted),
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Err(BrokerError::Aborted),
            Err(e) => return Err(e.into()),
        }
    }
    Ok(text.trim().to_string())
}

/// Ctrl-C while echo is off is recorded rather than acted on, so rpassword
/// restores the terminal first. The read then ends as an abort.
pub fn read_password_from_stdin(prompt: &str) -> Result<String> {
    loop {
        let read = {
            let _hidden = interrupt::hidden_prompt();
            rpassword::prompt_password(format!("{}: ", prompt))
        };
        let pass = hidden_input(read)?;

        if pass.trim().is_empty() {
            continue;
        }
        return Ok(pass.trim().to_string());
    }
}

fn hidden_input(read: io::Result<String>) -> Result<String> {
    if interrupt::take() {
        return Err(BrokerError::Aborted);
    }
    match read {
        Ok(pass) => Ok(pass),
        Err(e)
            if matches!(
                e.kind(),
                io::ErrorKind::UnexpectedEof | io::ErrorKind::Interrupted
            ) =>
        {
            Err(BrokerError::Aborted)
        }
        Err(e) => Err(e.into()),
    }
}
