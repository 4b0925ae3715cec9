use std::fmt;

use serde::{Deserialize, Serialize};

/// The closed set of roles an agent can be invoked with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AgentRole {
    TestAuthor,
    Implementer,
    Verifier,
}

impl AgentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TestAuthor => "test-author",
            Self::Implementer => "implementer",
            Self::Verifier => "verifier",
        }
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub title: String,
    pub agent_role: AgentRole,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub depends: Vec<String>,
    #[serde(default)]
    pub test_files: Vec<String>,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feature {
    pub name: String,
    /// Declared ownership. Used to scope fix cycles, not enforced here.
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub tasks: Vec<Task>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wave {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub foundation: Vec<Task>,
    #[serde(default)]
    pub features: Vec<Feature>,
    #[serde(default)]
    pub integration: Vec<Task>,
}

impl Wave {
    /// Every section of the wave, in execution order, with its tasks.
    pub fn sections(&self) -> Vec<(Section, &[Task])> {
        let mut out = Vec::with_capacity(self.features.len() + 2);
        out.push((Section::Foundation, self.foundation.as_slice()));
        for feature in &self.features {
            out.push((Section::Feature(feature.name.clone()), feature.tasks.as_slice()));
        }
        out.push((Section::Integration, self.integration.as_slice()));
        out
    }

    pub fn task_count(&self) -> usize {
        self.foundation.len()
            + self.integration.len()
            + self.features.iter().map(|f| f.tasks.len()).sum::<usize>()
    }

    /// Union of every feature's declared files, deduplicated, in plan order.
    pub fn feature_files(&self) -> Vec<String> {
        let mut files: Vec<String> = Vec::new();
        for file in self.features.iter().flat_map(|f| f.files.iter()) {
            if !files.contains(file) {
                files.push(file.clone());
            }
        }
        files
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub goal: String,
    /// Shared schema text handed to agents verbatim.
    #[serde(default)]
    pub data_schemas: String,
    #[serde(default)]
    pub waves: Vec<Wave>,
}

impl Plan {
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.waves.iter().flat_map(|wave| {
            wave.foundation
                .iter()
                .chain(wave.features.iter().flat_map(|f| f.tasks.iter()))
                .chain(wave.integration.iter())
        })
    }
}

/// The dependency scope a task belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Section {
    Foundation,
    Feature(String),
    Integration,
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Foundation => f.write_str("foundation"),
            Self::Feature(name) => write!(f, "feature '{name}'"),
            Self::Integration => f.write_str("integration"),
        }
    }
}
