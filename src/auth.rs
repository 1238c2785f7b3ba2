use anyhow::{Result, bail};
use std::io::{self, IsTerminal};
use zeroize::Zeroizing;

pub const PASSWORD_ENV: &str = "GATEKEEPER_PASSWORD";

/// Reads the password to hash or verify.
///
/// Sources in order: `GATEKEEPER_PASSWORD`, a piped stdin, a TTY prompt.
pub fn read_password() -> Result<Zeroizing<String>> {
    //  GATEKEEPER_PASSWORD="hunter2" gatekeeper hash
    if let Ok(pw) = std::env::var(PASSWORD_ENV) {
        if !pw.is_empty() {
            return Ok(Zeroizing::new(pw));
        }
    }

    //  printf "%s" "$PW" | gatekeeper hash
    if !io::stdin().is_terminal() {
        let mut buf = Zeroizing::new(String::new());
        io::stdin().read_line(&mut buf)?;
        let pw = buf.trim_end_matches(['\r', '\n']);

        if !pw.is_empty() {
            return Ok(Zeroizing::new(pw.to_string()));
        }
    }

    if io::stdin().is_terminal() {
        let pw = Zeroizing::new(rpassword::prompt_password("Password: ")?);
        if !pw.is_empty() {
            return Ok(pw);
        }
    }

    bail!("no password provided")
}
