//! Work-type catalog — the static set of classes tickets are triaged into.
//!
//! Read-only after startup. Used to ground prompts and answer lookups; the
//! pipeline's control flow never branches on catalog contents.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::CatalogError;

/// Broad grouping for work types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkTypeCategory {
    Hardware,
    Software,
    Network,
    Access,
    Consultation,
    Other,
    NotRelevant,
}

/// A single labeled work type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkType {
    /// Stable label returned by classifiers.
    pub id: String,
    pub name: String,
    pub category: WorkTypeCategory,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub examples: Vec<String>,
}

/// Immutable collection of work types, in catalog order.
#[derive(Debug, Clone)]
pub struct Catalog {
    work_types: Vec<WorkType>,
}

impl Catalog {
    /// Build a catalog, rejecting empty input and duplicate ids.
    pub fn new(work_types: Vec<WorkType>) -> Result<Self, CatalogError> {
        if work_types.is_empty() {
            return Err(CatalogError::Empty);
        }
        let mut seen = HashSet::new();
        for wt in &work_types {
            if !seen.insert(wt.id.as_str()) {
                return Err(CatalogError::DuplicateId(wt.id.clone()));
            }
        }
        Ok(Self { work_types })
    }

    /// Parse a catalog from a JSON array of work types.
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let work_types: Vec<WorkType> = serde_json::from_str(json)?;
        Self::new(work_types)
    }

    /// Load a catalog from a JSON file.
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let json = std::fs::read_to_string(path).map_err(|source| CatalogError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// The built-in IT support catalog.
    pub fn builtin() -> Self {
        Self {
            work_types: builtin_work_types(),
        }
    }

    pub fn all(&self) -> &[WorkType] {
        &self.work_types
    }

    pub fn len(&self) -> usize {
        self.work_types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.work_types.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&WorkType> {
        self.work_types.iter().find(|wt| wt.id == id)
    }

    pub fn by_category(&self, category: WorkTypeCategory) -> Vec<&WorkType> {
        self.work_types
            .iter()
            .filter(|wt| wt.category == category)
            .collect()
    }

    /// Work types with a keyword that contains, or is contained in, any of
    /// the given terms (case-insensitive). Each work type appears once.
    pub fn search_by_keywords(&self, terms: &[&str]) -> Vec<&WorkType> {
        let terms: Vec<String> = terms
            .iter()
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();

        self.work_types
            .iter()
            .filter(|wt| {
                wt.keywords.iter().any(|kw| {
                    let kw = kw.to_lowercase();
                    terms
                        .iter()
                        .any(|term| kw.contains(term.as_str()) || term.contains(kw.as_str()))
                })
            })
            .collect()
    }

    /// Render the catalog as a prompt-friendly listing.
    pub fn prompt_listing(&self) -> String {
        let mut out = String::with_capacity(self.work_types.len() * 160);
        for wt in &self.work_types {
            out.push_str(&format!("- {} — {}", wt.id, wt.name));
            if !wt.description.is_empty() {
                out.push_str(&format!(": {}", wt.description));
            }
            if !wt.keywords.is_empty() {
                out.push_str(&format!(" (keywords: {})", wt.keywords.join(", ")));
            }
            out.push('\n');
        }
        out
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::builtin()
    }
}

fn work_type(
    id: &str,
    name: &str,
    category: WorkTypeCategory,
    description: &str,
    keywords: &[&str],
    examples: &[&str],
) -> WorkType {
    WorkType {
        id: id.to_string(),
        name: name.to_string(),
        category,
        description: description.to_string(),
        keywords: keywords.iter().map(|s| s.to_string()).collect(),
        examples: examples.iter().map(|s| s.to_string()).collect(),
    }
}

fn builtin_work_types() -> Vec<WorkType> {
    use WorkTypeCategory::*;

    vec![
        work_type(
            "hw_workstation",
            "Workstation repair",
            Hardware,
            "Desktop or laptop does not power on, freezes, or has failed components",
            &["computer", "laptop", "pc", "monitor", "keyboard", "mouse", "won't turn on"],
            &["My office PC shuts down after five minutes"],
        ),
        work_type(
            "hw_printer",
            "Printer and scanner service",
            Hardware,
            "Printing, scanning, paper jams, toner replacement, printer driver issues",
            &["printer", "scanner", "toner", "cartridge", "paper jam", "mfp"],
            &["The printer on floor 3 jams on every page"],
        ),
        work_type(
            "sw_install",
            "Software installation",
            Software,
            "Install, update or license application software on a workstation",
            &["install", "software", "license", "update", "program", "office"],
            &["Please install a statistics package on my laptop"],
        ),
        work_type(
            "sw_failure",
            "Application malfunction",
            Software,
            "An installed application crashes, shows errors, or behaves incorrectly",
            &["error", "crash", "bug", "not responding", "freezes"],
            &["The spreadsheet app crashes when I open large files"],
        ),
        work_type(
            "net_setup",
            "Network connection setup",
            Network,
            "Connect a workstation or room to the wired network, configure ports",
            &["network", "ethernet", "cable", "port", "lan", "socket"],
            &["Need a network port activated in room 214"],
        ),
        work_type(
            "net_wifi",
            "Wireless access problems",
            Network,
            "Wi-Fi coverage, authentication to the wireless network, slow wireless",
            &["wifi", "wi-fi", "wireless", "hotspot", "signal"],
            &["Wi-Fi keeps dropping in the library reading room"],
        ),
        work_type(
            "access",
            "Account and access management",
            Access,
            "Create accounts, reset passwords, grant or revoke access to systems",
            &["password", "account", "login", "access", "permission", "locked"],
            &["I forgot my password for the staff portal"],
        ),
        work_type(
            "mail",
            "Corporate email",
            Software,
            "Mailbox setup, quota, delivery problems, mailing lists",
            &["email", "mail", "mailbox", "outlook", "spam"],
            &["My mailbox is full and I cannot receive messages"],
        ),
        work_type(
            "web_portal",
            "Websites and portals",
            Software,
            "Content updates and outages of the organization's websites and portals",
            &["website", "portal", "site", "page", "web"],
            &["The department page shows an outdated phone number"],
        ),
        work_type(
            "video_conf",
            "Video conferencing",
            Consultation,
            "Set up and support video calls, webinars and meeting-room equipment",
            &["zoom", "teams", "video", "webinar", "conference", "camera"],
            &["Need help running a webinar for 200 participants"],
        ),
        work_type(
            "consult",
            "IT consultation",
            Consultation,
            "General advice on IT services, procurement and usage",
            &["advice", "question", "how to", "recommend"],
            &["Which laptop model should our lab buy?"],
        ),
    ]
}
