//! Commit planning: turning recorded operations into validated copies

use crate::{CopyCommand, UploadError, UploadOperation};

/// Build the copy commands for a recorded batch
///
/// Zero-sized operations are dropped and the rest are sorted by destination
/// offset. With `coalesce` set, runs of single copies that are contiguous in
/// both the scratch and the destination are merged into one command.
pub fn plan_copies(operations: &[UploadOperation], coalesce: bool) -> Vec<CopyCommand> {
    let mut commands: Vec<CopyCommand> = operations
        .iter()
        .filter(|operation| operation.size > 0)
        .map(|&operation| CopyCommand::from(operation))
        .collect();

    commands.sort_by_key(|command| command.destination_offset);

    if !coalesce || commands.len() < 2 {
        return commands;
    }

    let mut merged: Vec<CopyCommand> = Vec::with_capacity(commands.len());
    for command in commands {
        match merged.last_mut() {
            Some(last) if last.can_append(&command) => last.size += command.size,
            _ => merged.push(command),
        }
    }

    merged
}

/// Check every command against the scratch and destination bounds
///
/// Runs before any copy is issued so a failing batch leaves the destination
/// untouched.
pub fn validate(
    commands: &[CopyCommand],
    written: usize,
    destination_len: u64,
) -> Result<(), UploadError> {
    for command in commands {
        let too_large = || UploadError::TransferTooLarge {
            requested: command.size,
            limit: destination_len,
        };

        let source_end = command
            .source_offset
            .checked_add(command.size)
            .ok_or_else(too_large)?;
        if source_end > written as u64 {
            return Err(UploadError::ScratchOutOfBounds {
                offset: command.source_offset,
                size: command.size,
                written: written as u64,
            });
        }

        let destination_end = command
            .size
            .checked_mul(u64::from(command.repeat_count))
            .and_then(|len| command.destination_offset.checked_add(len))
            .ok_or_else(too_large)?;
        if destination_end > destination_len {
            return Err(UploadError::DestinationOutOfBounds {
                offset: command.destination_offset,
                size: command.destination_len(),
                capacity: destination_len,
            });
        }
    }

    Ok(())
}
