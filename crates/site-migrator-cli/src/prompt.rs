//! Interactive confirmation before destructive work.

use site_migrator::{ConfirmationGate, ConfirmationRequest, Result};
use std::io::{self, BufRead, BufReader, Stderr, Stdin, Write};
use std::sync::Mutex;

/// Asks the operator to type the site id.
///
/// Anything other than the exact id, including end of input, declines.
pub struct PromptGate<R, W> {
    io: Mutex<(R, W)>,
}

impl PromptGate<BufReader<Stdin>, Stderr> {
    /// Reads stdin and prompts on stderr so stdout stays clean for the report.
    pub fn stdio() -> Self {
        Self::new(BufReader::new(io::stdin()), io::stderr())
    }
}

impl<R, W> PromptGate<R, W>
where
    R: BufRead + Send,
    W: Write + Send,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            io: Mutex::new((reader, writer)),
        }
    }

    /// Hand back the reader and writer.
    pub fn into_inner(self) -> (R, W) {
        self.io.into_inner().unwrap_or_else(|e| e.into_inner())
    }
}

fn write_request(out: &mut impl Write, request: &ConfirmationRequest) -> io::Result<()> {
    writeln!(
        out,
        "About to migrate site {} from {} to {}.",
        request.tenant, request.source, request.target
    )?;
    writeln!(out, "Rewrite rules:")?;
    for rule in &request.rules {
        writeln!(out, "  {rule}")?;
    }
    if request.target_is_production {
        writeln!(out, "WARNING: {} is production.", request.target)?;
    }
    if request.skip_backup {
        writeln!(out, "WARNING: {} will not be backed up first.", request.target)?;
    }
    write!(out, "Type the site id ({}) to continue: ", request.tenant)?;
    out.flush()
}

impl<R, W> ConfirmationGate for PromptGate<R, W>
where
    R: BufRead + Send,
    W: Write + Send,
{
    fn confirm(&self, request: &ConfirmationRequest) -> Result<bool> {
        let mut guard = self.io.lock().unwrap_or_else(|e| e.into_inner());
        let (reader, writer) = &mut *guard;

        write_request(writer, request)?;
        let mut answer = String::new();
        if reader.read_line(&mut answer)? == 0 {
            writeln!(writer)?;
            return Ok(false);
        }
        Ok(answer.trim() == request.tenant.to_string())
    }
}
