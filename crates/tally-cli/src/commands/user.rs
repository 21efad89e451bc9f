//! User command handlers
//!
//! Users live in the relational store only; they are never indexed.

use anyhow::{Context, Result};

use tally_core::{Database, SyncError, User};

use crate::output::Output;

/// Register a user with an already-hashed password
pub fn add(
    database: &Database,
    name: String,
    email: String,
    password_hash: String,
    output: &Output,
) -> Result<()> {
    let user = User {
        id: None,
        name,
        email,
        password_hash,
    };

    let created = database
        .create_user(&user)
        .map_err(SyncError::from)
        .with_context(|| format!("Failed to register {}", user.email))?;

    output.print_user("Registered user", &created);
    Ok(())
}

/// Look a user up by email
pub fn show(database: &Database, email: String, output: &Output) -> Result<()> {
    let user = database
        .find_user_by_email(&email)
        .map_err(SyncError::from)?
        .ok_or_else(|| SyncError::Validation(format!("No user with email {}", email)))?;

    output.print_user("", &user);
    Ok(())
}
