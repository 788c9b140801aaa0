// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The internal authorization capability (§9 redesign notes) that lets the
//! Store ask the factory for a transition a producer may never request
//! directly (`deleted`, `expired`, and stealth patches in general).
//!
//! `CoreToken` has no public constructor — only code inside this crate
//! (the Store) can mint one, so it can never leak into a plugin's hands
//! even though the type itself is `pub`.

#[derive(Debug, Clone, Copy)]
pub struct CoreToken(());

impl CoreToken {
    pub(crate) fn issue() -> Self {
        CoreToken(())
    }
}
