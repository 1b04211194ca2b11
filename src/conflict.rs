use serde::{Deserialize, Serialize};

use crate::domain::{ConflictAction, Kind};
use crate::error::CatalogError;
use crate::payload::DatasetPayload;

/// How conflicting imports are settled. Lives in the settings file and is
/// read by the import loop, never by the catalog itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictPolicy {
    #[serde(default = "default_ask_user")]
    pub ask_user: bool,
    #[serde(default = "default_fallback")]
    pub default_action: Option<ConflictAction>,
}

fn default_ask_user() -> bool {
    true
}

fn default_fallback() -> Option<ConflictAction> {
    Some(ConflictAction::Merge)
}

impl Default for ConflictPolicy {
    fn default() -> Self {
        Self {
            ask_user: default_ask_user(),
            default_action: default_fallback(),
        }
    }
}

impl ConflictPolicy {
    pub fn fixed(action: ConflictAction) -> Self {
        Self {
            ask_user: false,
            default_action: Some(action),
        }
    }

    pub fn ask(fallback: Option<ConflictAction>) -> Self {
        Self {
            ask_user: true,
            default_action: fallback,
        }
    }
}

/// A proposed insert that hit an existing entry.
#[derive(Debug, Clone, Copy)]
pub struct Conflict<'a> {
    pub kind: Kind,
    pub key: Option<&'a str>,
    pub existing_key_present: bool,
    pub existing: Option<&'a DatasetPayload>,
}

impl Conflict<'_> {
    pub fn describe(&self) -> String {
        match self.key {
            Some(key) => format!("{key} already exists in {}", self.kind),
            None => format!("{} already exists in the document", self.kind),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptResponse {
    pub action: ConflictAction,
    /// The user asked not to be asked again for this session.
    pub remember: bool,
}

/// Interactive collaborator asked once per conflicting insert.
pub trait ConflictPrompt {
    fn ask(&mut self, conflict: &Conflict<'_>) -> PromptResponse;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub action: ConflictAction,
    /// Set when the decision came from a prompt with "don't ask again" checked.
    pub remember: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ImportConflictResolver {
    policy: ConflictPolicy,
}

impl ImportConflictResolver {
    pub fn new(policy: ConflictPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> ConflictPolicy {
        self.policy
    }

    /// Decide what to do with one insert. `None` means there is nothing to
    /// resolve because the target is free.
    ///
    /// With `ask_user == false` this is pure: no prompt is consulted.
    pub fn resolve(
        &self,
        conflict: &Conflict<'_>,
        prompt: Option<&mut (dyn ConflictPrompt + '_)>,
    ) -> Result<Option<Resolution>, CatalogError> {
        if !conflict.existing_key_present {
            return Ok(None);
        }
        if self.policy.ask_user {
            if let Some(prompt) = prompt {
                let response = prompt.ask(conflict);
                return Ok(Some(Resolution {
                    action: response.action,
                    remember: response.remember,
                }));
            }
            tracing::warn!(
                conflict = %conflict.describe(),
                "no conflict prompt available, using default action"
            );
        }
        let action = self
            .policy
            .default_action
            .ok_or(CatalogError::InvalidConflictPolicy)?;
        Ok(Some(Resolution {
            action,
            remember: false,
        }))
    }
}

/// Combines an existing payload with an incoming one of the same kind.
pub trait MergeStrategy {
    fn merge(&self, existing: &DatasetPayload, incoming: DatasetPayload) -> DatasetPayload;
}

impl<F> MergeStrategy for F
where
    F: Fn(&DatasetPayload, DatasetPayload) -> DatasetPayload,
{
    fn merge(&self, existing: &DatasetPayload, incoming: DatasetPayload) -> DatasetPayload {
        self(existing, incoming)
    }
}

/// Dictionary-update merge: start from the existing payload and overwrite
/// with whatever the incoming payload actually carries.
///
/// Non-empty arrays and labels of `incoming` win. Metadata, annotations and
/// deconvolution results are unioned with incoming keys winning. The existing
/// default axes are kept.
#[derive(Debug, Clone, Copy, Default)]
pub struct UpdateMerge;

impl MergeStrategy for UpdateMerge {
    fn merge(&self, existing: &DatasetPayload, mut incoming: DatasetPayload) -> DatasetPayload {
        let mut merged = existing.clone();
        if !incoming.x_values.is_empty() {
            merged.x_values = std::mem::take(&mut incoming.x_values);
        }
        if !incoming.y_values.is_empty() {
            merged.y_values = std::mem::take(&mut incoming.y_values);
        }
        if incoming.z_values.is_some() {
            merged.z_values = incoming.z_values.take();
        }
        if !incoming.x_label.is_empty() {
            merged.x_label = std::mem::take(&mut incoming.x_label);
        }
        if !incoming.y_label.is_empty() {
            merged.y_label = std::mem::take(&mut incoming.y_label);
        }
        merged.metadata.append(&mut incoming.metadata);
        if let Some(annotations) = incoming.take_annotations() {
            let mut combined = merged.take_annotations().unwrap_or_default();
            combined.extend(annotations);
            merged.set_annotations(combined);
        }
        if let Some(results) = incoming.take_unidec_results() {
            for (name, result) in results {
                merged.insert_unidec_result(name, result);
            }
        }
        merged
    }
}
