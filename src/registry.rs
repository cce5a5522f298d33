// viamime – implementation of the MIME security multiparts
// Copyright © 2022–2023 David Bürgin <dbuergin@gluet.ch>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later
// version.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more
// details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.

//! Default cryptography context registry.
//!
//! Envelope operations that are not given a context explicitly look one up
//! here by protocol name. The process-wide registry is meant to be populated
//! once at startup, with [`init`] or [`register`], and only read afterwards.
//! Lookups take a shared read lock and never modify the registry.

use crate::{crypto::CryptoContext, envelope::EnvelopeError};
use std::{
    fmt::{self, Debug, Formatter},
    sync::{Arc, OnceLock, PoisonError, RwLock},
};
use tracing::debug;

/// An ordered collection of cryptography contexts.
#[derive(Clone, Default)]
pub struct ContextRegistry {
    contexts: Vec<Arc<dyn CryptoContext>>,
}

impl ContextRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a context. Contexts registered earlier take precedence.
    pub fn register(&mut self, ctx: Arc<dyn CryptoContext>) {
        self.contexts.push(ctx);
    }

    /// Returns the first context that supports the given protocol.
    pub fn lookup(&self, protocol: &str) -> Result<Arc<dyn CryptoContext>, EnvelopeError> {
        self.contexts
            .iter()
            .find(|ctx| ctx.supports(protocol))
            .cloned()
            .ok_or_else(|| EnvelopeError::NoDefaultContext(protocol.to_owned()))
    }

    pub fn clear(&mut self) {
        self.contexts.clear();
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }
}

impl Debug for ContextRegistry {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.contexts.iter().map(|ctx| ctx.signature_protocol()))
            .finish()
    }
}

static REGISTRY: OnceLock<RwLock<ContextRegistry>> = OnceLock::new();

fn global() -> &'static RwLock<ContextRegistry> {
    REGISTRY.get_or_init(Default::default)
}

/// Replaces the contents of the process-wide registry.
pub fn init(registry: ContextRegistry) {
    debug!(contexts = registry.len(), "initializing context registry");
    *global().write().unwrap_or_else(PoisonError::into_inner) = registry;
}

/// Adds a context to the process-wide registry.
pub fn register(ctx: Arc<dyn CryptoContext>) {
    debug!(protocol = ctx.signature_protocol(), "registering context");
    global()
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .register(ctx);
}

/// Looks up the process-wide default context for a protocol.
pub fn lookup(protocol: &str) -> Result<Arc<dyn CryptoContext>, EnvelopeError> {
    global()
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .lookup(protocol)
}

/// Removes all contexts from the process-wide registry.
pub fn clear() {
    global()
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .clear();
}
