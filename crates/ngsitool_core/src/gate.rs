use std::io::Write;

use crate::error::MigrationResult;
use crate::migrate::Operation;

pub fn advisory_message(operation: Operation, count: usize) -> String {
    format!(
        "{count} entities will be {}. run {} with --run option",
        operation.past_participle(),
        operation.verb()
    )
}

/// Returns `true` when the job may mutate. Without confirmation, writes the
/// advisory line to `out` and returns `false`.
pub fn check<W: Write + ?Sized>(
    confirmed: bool,
    operation: Operation,
    count: usize,
    out: &mut W,
) -> MigrationResult<bool> {
    if confirmed {
        return Ok(true);
    }
    writeln!(out, "{}", advisory_message(operation, count))?;
    Ok(false)
}
