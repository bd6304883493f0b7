//! The set of placeholder names in use.
//!
//! Expressions and their placeholders are reference counted and never leave
//! the thread that made them, so each thread keeps its own registry. Names
//! stay registered until `clear` is called, even after every placeholder
//! using them has been dropped.

use std::cell::RefCell;
use std::collections::BTreeSet;

use tracing::debug;

use crate::error::{Error, Result};
use crate::var::LambdaVar;

pub const ARGS: &str = "*args";
pub const KWARGS: &str = "**kwargs";

#[derive(Default)]
struct Registry {
    names: BTreeSet<String>,
    args: Option<LambdaVar>,
    kwargs: Option<LambdaVar>,
}

thread_local! {
    static REGISTRY: RefCell<Registry> = RefCell::new(Registry::default());
}

/// Records `name`, failing if it is already taken.
pub fn register(name: &str) -> Result<()> {
    REGISTRY.with(|registry| {
        let mut registry = registry.borrow_mut();
        if registry.names.contains(name) {
            return Err(Error::NamingConflict(name.to_string()));
        }
        registry.names.insert(name.to_string());
        debug!(name, "registered placeholder");
        Ok(())
    })
}

pub fn is_registered(name: &str) -> bool {
    REGISTRY.with(|registry| registry.borrow().names.contains(name))
}

/// Every registered name, sorted.
pub fn registered_names() -> Vec<String> {
    REGISTRY.with(|registry| registry.borrow().names.iter().cloned().collect())
}

/// Forgets every name, including the variadic markers. Placeholders made
/// before keep working, but their names can be registered again.
pub fn clear() {
    // move the markers out before dropping them, outside the borrow.
    let old = REGISTRY.with(|registry| registry.replace(Registry::default()));
    debug!(names = old.names.len(), "cleared placeholder registry");
}

/// The shared marker for `*args` or `**kwargs`, created and registered on
/// first use.
pub(crate) fn variadic(name: &'static str) -> LambdaVar {
    REGISTRY.with(|registry| {
        let mut registry = registry.borrow_mut();
        let existing = if name == KWARGS { &registry.kwargs } else { &registry.args };
        if let Some(marker) = existing {
            return marker.clone();
        }
        let marker = LambdaVar::marker(name);
        registry.names.insert(name.to_string());
        if name == KWARGS {
            registry.kwargs = Some(marker.clone());
        } else {
            registry.args = Some(marker.clone());
        }
        debug!(name, "created variadic marker");
        marker
    })
}
