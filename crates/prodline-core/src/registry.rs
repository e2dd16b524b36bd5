use std::collections::HashMap;

use slotmap::SlotMap;

use crate::config::BuildError;
use crate::id::StageId;
use crate::stage::{Stage, StageKind};

/// Owns every stage of a line and resolves names and kinds to stages.
///
/// Stages keep the order in which they were declared; ticks and reports
/// follow that order.
#[derive(Debug, Default)]
pub struct StageRegistry {
    pub(crate) stages: SlotMap<StageId, Stage>,
    pub(crate) order: Vec<StageId>,
    by_name: HashMap<String, StageId>,
    by_kind: [Vec<String>; 7],
}

impl StageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a stage. Names must be unique.
    pub fn insert(&mut self, stage: Stage) -> Result<StageId, BuildError> {
        if self.by_name.contains_key(&stage.name) {
            return Err(BuildError::DuplicateStage { name: stage.name });
        }
        let name = stage.name.clone();
        let kind = stage.kind();
        let id = self.stages.insert(stage);
        self.order.push(id);
        self.by_kind[kind.index()].push(name.clone());
        self.by_name.insert(name, id);
        Ok(id)
    }

    pub fn get(&self, id: StageId) -> Option<&Stage> {
        self.stages.get(id)
    }

    pub fn get_mut(&mut self, id: StageId) -> Option<&mut Stage> {
        self.stages.get_mut(id)
    }

    pub fn id_of(&self, name: &str) -> Option<StageId> {
        self.by_name.get(name).copied()
    }

    pub fn by_name(&self, name: &str) -> Option<&Stage> {
        self.id_of(name).and_then(|id| self.stages.get(id))
    }

    pub fn name_of(&self, id: StageId) -> Option<&str> {
        self.stages.get(id).map(|s| s.name.as_str())
    }

    /// Stage ids in declared order.
    pub fn order(&self) -> &[StageId] {
        &self.order
    }

    /// Names of all stages of `kind`, in declared order.
    pub fn names_of(&self, kind: StageKind) -> &[String] {
        &self.by_kind[kind.index()]
    }

    /// Kinds that have at least one stage.
    pub fn kinds(&self) -> Vec<StageKind> {
        StageKind::ALL
            .into_iter()
            .filter(|k| !self.by_kind[k.index()].is_empty())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::{Buffer, Receiver, StageBehavior};

    fn buffer(name: &str) -> Stage {
        Stage::new(name, StageBehavior::Buffer(Buffer::new(1)))
    }

    #[test]
    fn insert_and_lookup() {
        let mut reg = StageRegistry::new();
        let id = reg.insert(buffer("buf")).unwrap();
        assert_eq!(reg.id_of("buf"), Some(id));
        assert_eq!(reg.name_of(id), Some("buf"));
        assert_eq!(reg.by_name("buf").map(Stage::kind), Some(StageKind::Buffer));
        assert!(reg.id_of("missing").is_none());
    }

    #[test]
    fn duplicate_names_are_refused() {
        let mut reg = StageRegistry::new();
        reg.insert(buffer("buf")).unwrap();
        assert_eq!(
            reg.insert(buffer("buf")),
            Err(BuildError::DuplicateStage { name: "buf".into() })
        );
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn kind_index_keeps_declared_order() {
        let mut reg = StageRegistry::new();
        reg.insert(buffer("b2")).unwrap();
        reg.insert(Stage::new("sink", StageBehavior::Receiver(Receiver::storer())))
            .unwrap();
        reg.insert(buffer("b1")).unwrap();
        assert_eq!(reg.names_of(StageKind::Buffer), &["b2".to_string(), "b1".to_string()]);
        assert_eq!(reg.kinds(), vec![StageKind::Buffer, StageKind::Receiver]);
        assert!(reg.names_of(StageKind::Assembler).is_empty());
    }
}
