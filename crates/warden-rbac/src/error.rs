// Warden
// Copyright (C) 2025 Wardenlabs

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.

// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! Error types for the RBAC engine
//!
//! Authorization refusals are not errors: operations such as `can_grant`
//! return structured decision objects with a `reason`. The variants here are
//! reserved for missing entities, constraint violations, and infrastructure
//! failures.

use thiserror::Error;

/// RBAC engine error types
#[derive(Error, Debug)]
pub enum RbacError {
    #[error("Not found: {message}")]
    NotFound { message: String },

    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("Cycle: {message}")]
    Cycle { message: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Store error: {message}")]
    Store { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RbacError {
    /// Create a not-found error
    pub fn not_found(message: impl Into<String>) -> Self {
        RbacError::NotFound { message: message.into() }
    }

    /// Create a conflict error
    pub fn conflict(message: impl Into<String>) -> Self {
        RbacError::Conflict { message: message.into() }
    }

    /// Create a cycle error
    pub fn cycle(message: impl Into<String>) -> Self {
        RbacError::Cycle { message: message.into() }
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        RbacError::Validation { message: message.into() }
    }

    /// Create a store error
    pub fn store(message: impl Into<String>) -> Self {
        RbacError::Store { message: message.into() }
    }
}

/// Result type for RBAC operations
pub type RbacResult<T> = Result<T, RbacError>;
