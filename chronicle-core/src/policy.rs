//! Content-sensitivity policy.
//!
//! The policy decides how mature prose is stored (redacted, sealed in the vault,
//! or kept inline) and whether sealed prose may be revealed on read.

use serde::{Deserialize, Serialize};

/// How mature prose is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatureHandling {
    /// Replace with a placeholder and discard the true content.
    #[default]
    Redact,
    /// Seal into the vault and keep only the reference.
    #[serde(alias = "reference")]
    Vault,
    /// Keep the content inline (requires age verification).
    #[serde(alias = "inline_if_allowed")]
    Inline,
}

/// Storage and rendering policy for one chronicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    pub sfw_mode: bool,
    pub mature_handling: MatureHandling,
    pub age_verified: bool,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            sfw_mode: true,
            mature_handling: MatureHandling::Redact,
            age_verified: false,
        }
    }
}

impl Policy {
    /// A policy that seals mature prose into the vault.
    pub fn vaulted() -> Self {
        Self {
            mature_handling: MatureHandling::Vault,
            ..Self::default()
        }
    }

    pub fn with_handling(mut self, handling: MatureHandling) -> Self {
        self.mature_handling = handling;
        self
    }

    pub fn with_sfw_mode(mut self, sfw_mode: bool) -> Self {
        self.sfw_mode = sfw_mode;
        self
    }

    pub fn with_age_verified(mut self, age_verified: bool) -> Self {
        self.age_verified = age_verified;
        self
    }

    /// The handling actually applied to mature prose.
    ///
    /// Inline storage without age verification degrades to redaction.
    pub fn effective_handling(&self) -> MatureHandling {
        match self.mature_handling {
            MatureHandling::Inline if !self.age_verified => MatureHandling::Redact,
            other => other,
        }
    }

    /// Whether sealed prose may be decrypted for display.
    pub fn may_reveal(&self) -> bool {
        self.age_verified && !self.sfw_mode
    }
}

/// Sensitivity flag declared on an event draft.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sensitivity {
    #[default]
    General,
    Mature,
}

impl Sensitivity {
    pub fn is_mature(&self) -> bool {
        matches!(self, Sensitivity::Mature)
    }
}

/// Which prose field a placeholder stands in for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProseKind {
    Narrative,
    Action,
    Outcome,
    Consequence,
    Scene,
    Summary,
}

impl ProseKind {
    /// Placeholder stored when prose of this kind is redacted.
    pub fn redaction_placeholder(&self) -> &'static str {
        match self {
            ProseKind::Narrative => "[Content redacted - mature themes present]",
            ProseKind::Action => "[Action redacted - mature content]",
            ProseKind::Outcome => "[Outcome redacted - mature content]",
            ProseKind::Consequence => "[Consequence redacted - mature content]",
            ProseKind::Scene => "[Scene details redacted - mature content]",
            ProseKind::Summary => "[Update redacted - mature content]",
        }
    }
}

/// Placeholder shown for vaulted prose that is not being revealed.
pub const SEALED_PLACEHOLDER: &str = "[Sealed content - mature themes present]";

/// Default keywords that flag prose as mature.
const MATURE_KEYWORDS: &[&str] = &[
    "explicit", "sexual", "intimate", "romantic", "adult", "violence", "blood", "death",
    "drugs", "alcohol",
];

/// Keyword screen that escalates unflagged prose to mature in SFW mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentScreen {
    keywords: Vec<String>,
}

impl Default for ContentScreen {
    fn default() -> Self {
        Self::new(MATURE_KEYWORDS.iter().copied())
    }
}

impl ContentScreen {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keywords: keywords
                .into_iter()
                .map(|k| k.into().to_lowercase())
                .collect(),
        }
    }

    /// A screen that never flags anything.
    pub fn disabled() -> Self {
        Self {
            keywords: Vec::new(),
        }
    }

    pub fn flags(&self, text: &str) -> bool {
        if self.keywords.is_empty() {
            return false;
        }
        let lower = text.to_lowercase();
        self.keywords.iter().any(|k| lower.contains(k.as_str()))
    }

    pub fn flags_any<'a>(&self, texts: impl IntoIterator<Item = &'a str>) -> bool {
        texts.into_iter().any(|t| self.flags(t))
    }
}
