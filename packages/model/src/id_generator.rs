use crate::ObjectId;
use uuid::Uuid;

/// Source of fresh object and rule ids
#[derive(Debug, Clone, Default)]
pub enum IdGenerator {
    /// Random UUID v4 ids, safe across replicas
    #[default]
    Random,

    /// `{seed}-{n}` ids, deterministic for tests and fixtures
    Sequential { seed: String, count: u64 },
}

impl IdGenerator {
    pub fn sequential(seed: impl Into<String>) -> Self {
        Self::Sequential {
            seed: seed.into(),
            count: 0,
        }
    }

    /// Generate next id
    pub fn new_id(&mut self) -> ObjectId {
        match self {
            IdGenerator::Random => ObjectId::new(Uuid::new_v4().to_string()),
            IdGenerator::Sequential { seed, count } => {
                *count += 1;
                ObjectId::new(format!("{}-{}", seed, count))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_ids() {
        let mut gen = IdGenerator::sequential("doc");

        assert_eq!(gen.new_id().as_str(), "doc-1");
        assert_eq!(gen.new_id().as_str(), "doc-2");
        assert_eq!(gen.new_id().as_str(), "doc-3");
    }

    #[test]
    fn test_random_ids_are_distinct() {
        let mut gen = IdGenerator::default();
        assert_ne!(gen.new_id(), gen.new_id());
    }
}
