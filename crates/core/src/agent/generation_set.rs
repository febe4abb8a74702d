//! The three generations (one per category) belonging to one version.

use crate::cache::{Category, Generation};
use crate::config::AgentConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationSet {
    version: String,
    generations: [Generation; 3],
}

impl GenerationSet {
    pub fn for_version(config: &AgentConfig, version: &str) -> Self {
        Self {
            version: version.to_string(),
            generations: Category::ALL.map(|category| config.generation(version, category)),
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn get(&self, category: Category) -> &Generation {
        match category {
            Category::Static => &self.generations[0],
            Category::Runtime => &self.generations[1],
            Category::Image => &self.generations[2],
        }
    }

    pub fn all(&self) -> &[Generation] {
        &self.generations
    }
}
