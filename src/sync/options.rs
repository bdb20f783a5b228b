//! Options Synchronizer.
//!
//! Engine to document: mirror the engine's options into `__options` when the
//! bytes differ. Suppressed while the analysis is initializing, since that is
//! the engine echoing what the document just told it.
//!
//! Document to engine: a remote change to `__options` is decoded, stamped with
//! the next revision and pushed as authoritative. Local commits never reach
//! this path, which is what keeps the two directions from feeding each other.

use tracing::{debug, trace, warn};

use crate::core::{AnalysisOptions, Revision};
use crate::doc::node;
use crate::doc::{AttrValue, AttributeChange, DocumentStore, TxnToken};
use crate::engine::AnalysisEngine;

use super::SyncError;
use super::resource::AnalysisResource;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PushOutcome {
    Written,
    Unchanged,
    /// Bootstrap echo.
    Suppressed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PullOutcome {
    Pushed(Revision),
    Unchanged,
    /// The new value could not be decoded; the resource needs a recompute.
    Undecodable,
}

pub fn push_engine_options<D: DocumentStore + ?Sized>(
    doc: &mut D,
    txn: &TxnToken,
    resource: &AnalysisResource,
    options: &AnalysisOptions,
) -> Result<PushOutcome, SyncError> {
    if resource.initializing {
        trace!(analysis = %resource.id, "options echo during bootstrap suppressed");
        return Ok(PushOutcome::Suppressed);
    }
    let bytes = options.encode()?;
    if node::stored_options_bytes(&*doc, &resource.element).as_deref() == Some(bytes.as_slice()) {
        trace!(analysis = %resource.id, "options unchanged");
        return Ok(PushOutcome::Unchanged);
    }
    doc.set_attribute(txn, &resource.element, node::OPTIONS, AttrValue::Bytes(bytes))?;
    debug!(analysis = %resource.id, "engine options mirrored into document");
    Ok(PushOutcome::Written)
}

pub fn pull_document_options<E: AnalysisEngine + ?Sized>(
    engine: &mut E,
    resource: &mut AnalysisResource,
    change: &AttributeChange,
) -> Result<PullOutcome, SyncError> {
    let Some(new) = change.new.as_ref() else {
        return Ok(PullOutcome::Unchanged);
    };
    if !change.is_update() {
        return Ok(PullOutcome::Unchanged);
    }
    // Same payload in another encoding (hex string vs bytes) is not a change.
    let old_bytes = change
        .old
        .as_ref()
        .and_then(|old| node::options_bytes(old).ok());
    if let (Some(old), Ok(new)) = (old_bytes, node::options_bytes(new)) {
        if old == new {
            return Ok(PullOutcome::Unchanged);
        }
    }

    let options = match node::decode_options(new) {
        Ok(options) => options,
        Err(err) => {
            resource.needs_recompute = true;
            warn!(analysis = %resource.id, error = %err, "document options unreadable");
            return Ok(PullOutcome::Undecodable);
        }
    };

    let revision = resource.revision.next();
    resource.revision = revision;
    resource.needs_recompute = false;
    engine.set_options(resource.handle, &options, revision, true)?;
    debug!(analysis = %resource.id, %revision, "document options pushed to engine");
    Ok(PullOutcome::Pushed(revision))
}
