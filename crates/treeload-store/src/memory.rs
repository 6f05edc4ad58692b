//! In-memory reference graph store.
//!
//! Layout follows a columnar property graph:
//!
//! 1. **String interning**: property names and string values are stored once
//!    and referenced by `StrId`
//! 2. **Columnar properties**: `property -> (node -> value)`
//! 3. **Label index**: one roaring bitmap of node ids per kind
//! 4. **Key index**: `(kind, id) -> nodes`, the lookup behind every match/merge
//! 5. **Edge lists**: forward and backward adjacency by node
//!
//! Each `execute` is atomic: mutations are journaled and undone if any
//! command in the batch fails.

use ahash::{AHashMap, AHashSet};
use roaring::RoaringBitmap;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use treeload_model::entity::PropValue;
use treeload_model::{
    var_ref, Batch, BulkPass, Command, Entity, EntityKey, EntityKind, KindCounts,
};

use crate::{GraphStore, Result, StoreError, StoreSession};

// ============================================================================
// String Interning
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
struct StrId(u32);

#[derive(Debug, Default)]
struct StringInterner {
    str_to_id: AHashMap<String, StrId>,
    id_to_str: Vec<String>,
}

impl StringInterner {
    fn intern(&mut self, s: &str) -> StrId {
        if let Some(id) = self.str_to_id.get(s) {
            return *id;
        }
        let id = StrId(self.id_to_str.len() as u32);
        self.str_to_id.insert(s.to_string(), id);
        self.id_to_str.push(s.to_string());
        id
    }

    fn id_of(&self, s: &str) -> Option<StrId> {
        self.str_to_id.get(s).copied()
    }

    fn lookup(&self, id: StrId) -> &str {
        self.id_to_str
            .get(id.0 as usize)
            .map(String::as_str)
            .unwrap_or("")
    }
}

// ============================================================================
// Node Storage (Columnar)
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Value {
    Int(i64),
    Str(StrId),
}

/// An owned property value, as seen from outside the store.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum PropertyValue {
    Int(i64),
    Str(String),
}

/// Resolved view of one stored node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeView {
    pub kind: EntityKind,
    pub properties: BTreeMap<String, PropertyValue>,
}

#[derive(Debug, Default)]
struct NodeStore {
    kinds: Vec<EntityKind>,
    /// Stable entity id of each node (the `id` property, kept hot).
    ids: Vec<u64>,
    /// property -> (node -> value)
    columns: AHashMap<StrId, AHashMap<u32, Value>>,
    label_index: AHashMap<EntityKind, RoaringBitmap>,
    key_index: AHashMap<(EntityKind, u64), Vec<u32>>,
}

impl NodeStore {
    fn len(&self) -> usize {
        self.kinds.len()
    }

    fn add(&mut self, kind: EntityKind, id: u64) -> u32 {
        let node = self.kinds.len() as u32;
        self.kinds.push(kind);
        self.ids.push(id);
        self.label_index
            .entry(kind)
            .or_insert_with(RoaringBitmap::new)
            .insert(node);
        self.key_index.entry((kind, id)).or_default().push(node);
        node
    }

    /// Remove the most recently added node. Only valid while undoing.
    fn pop(&mut self) {
        let (Some(kind), Some(id)) = (self.kinds.pop(), self.ids.pop()) else {
            return;
        };
        let node = self.kinds.len() as u32;
        if let Some(bitmap) = self.label_index.get_mut(&kind) {
            bitmap.remove(node);
        }
        if let Some(nodes) = self.key_index.get_mut(&(kind, id)) {
            nodes.retain(|&n| n != node);
            if nodes.is_empty() {
                self.key_index.remove(&(kind, id));
            }
        }
        for column in self.columns.values_mut() {
            column.remove(&node);
        }
    }

    fn find(&self, key: EntityKey) -> Option<u32> {
        self.key_index
            .get(&(key.kind, key.id))
            .and_then(|nodes| nodes.first().copied())
    }

    fn get(&self, node: u32, prop: StrId) -> Option<Value> {
        self.columns.get(&prop)?.get(&node).copied()
    }

    fn set(&mut self, node: u32, prop: StrId, value: Option<Value>) -> Option<Value> {
        match value {
            Some(value) => self.columns.entry(prop).or_default().insert(node, value),
            None => self.columns.get_mut(&prop).and_then(|c| c.remove(&node)),
        }
    }
}

// ============================================================================
// Edge Storage
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Edge {
    source: u32,
    target: u32,
}

#[derive(Debug, Default)]
struct EdgeStore {
    edges: Vec<Edge>,
    forward: AHashMap<u32, Vec<u32>>,
    backward: AHashMap<u32, Vec<u32>>,
}

impl EdgeStore {
    fn len(&self) -> usize {
        self.edges.len()
    }

    fn add(&mut self, source: u32, target: u32) -> u32 {
        let id = self.edges.len() as u32;
        self.forward.entry(source).or_default().push(id);
        self.backward.entry(target).or_default().push(id);
        self.edges.push(Edge { source, target });
        id
    }

    fn pop(&mut self) {
        let Some(edge) = self.edges.pop() else {
            return;
        };
        if let Some(ids) = self.forward.get_mut(&edge.source) {
            ids.pop();
        }
        if let Some(ids) = self.backward.get_mut(&edge.target) {
            ids.pop();
        }
    }

    fn has_edge(&self, source: u32, target: u32) -> bool {
        self.forward
            .get(&source)
            .map(|ids| {
                ids.iter()
                    .any(|&id| self.edges.get(id as usize).map(|e| e.target) == Some(target))
            })
            .unwrap_or(false)
    }

    fn incoming(&self, target: u32) -> usize {
        self.backward.get(&target).map(Vec::len).unwrap_or(0)
    }
}

// ============================================================================
// Graph
// ============================================================================

/// Shape summary used by validation and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GraphCensus {
    pub directories: usize,
    pub files: usize,
    pub edges: usize,
    /// Key-only placeholders whose full record never arrived.
    pub stubs: usize,
    /// Nodes without an incoming `PARENT_OF` edge.
    pub roots: usize,
}

/// The in-memory reference store.
#[derive(Debug, Default)]
pub struct MemoryGraph {
    interner: StringInterner,
    nodes: NodeStore,
    edges: EdgeStore,
    constraints: BTreeSet<EntityKind>,
    executes: usize,
    fail_on_execute: Option<usize>,
}

enum Undo {
    NodeAdded,
    EdgeAdded,
    PropSet {
        node: u32,
        prop: StrId,
        previous: Option<Value>,
    },
    Bound {
        id: u64,
        previous: Option<u32>,
    },
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the `n`-th `execute` call (1-based, counted across sessions)
    /// fail with a store error.
    pub fn fail_on_execute(&mut self, n: usize) {
        self.fail_on_execute = Some(self.executes + n);
    }

    pub fn has_constraint(&self, kind: EntityKind) -> bool {
        self.constraints.contains(&kind)
    }

    pub fn census(&self) -> GraphCensus {
        let mut census = GraphCensus {
            edges: self.edges.len(),
            ..GraphCensus::default()
        };
        let name = self.interner.id_of("name");
        for node in 0..self.nodes.len() as u32 {
            match self.nodes.kinds[node as usize] {
                EntityKind::Directory => census.directories += 1,
                EntityKind::File => census.files += 1,
            }
            if name.and_then(|p| self.nodes.get(node, p)).is_none() {
                census.stubs += 1;
            }
            if self.edges.incoming(node) == 0 {
                census.roots += 1;
            }
        }
        census
    }

    /// Every edge as `(parent id, child id)`, sorted.
    pub fn edge_endpoints(&self) -> Vec<(u64, u64)> {
        let mut out: Vec<(u64, u64)> = self
            .edges
            .edges
            .iter()
            .map(|e| {
                (
                    self.nodes.ids[e.source as usize],
                    self.nodes.ids[e.target as usize],
                )
            })
            .collect();
        out.sort_unstable();
        out
    }

    /// Number of nodes stored under `(kind, id)`; more than one only happens
    /// without a uniqueness constraint.
    pub fn duplicates_of(&self, key: EntityKey) -> usize {
        self.nodes
            .key_index
            .get(&(key.kind, key.id))
            .map(Vec::len)
            .unwrap_or(0)
    }

    pub fn node(&self, key: EntityKey) -> Option<NodeView> {
        let node = self.nodes.find(key)?;
        let mut properties = BTreeMap::new();
        for (prop, column) in &self.nodes.columns {
            if let Some(value) = column.get(&node) {
                let value = match *value {
                    Value::Int(v) => PropertyValue::Int(v),
                    Value::Str(s) => PropertyValue::Str(self.interner.lookup(s).to_string()),
                };
                properties.insert(self.interner.lookup(*prop).to_string(), value);
            }
        }
        Some(NodeView {
            kind: key.kind,
            properties,
        })
    }

    fn value_of(&mut self, value: PropValue<'_>) -> Value {
        match value {
            PropValue::Int(v) => Value::Int(v),
            PropValue::Str(s) => Value::Str(self.interner.intern(s)),
        }
    }

    fn set_prop(&mut self, node: u32, name: &str, value: PropValue<'_>, journal: &mut Vec<Undo>) {
        let prop = self.interner.intern(name);
        let value = self.value_of(value);
        let previous = self.nodes.set(node, prop, Some(value));
        journal.push(Undo::PropSet {
            node,
            prop,
            previous,
        });
    }

    /// Overwrite the whole record: every property of `entity` is written and
    /// any property it does not carry is cleared.
    fn write_record(&mut self, node: u32, entity: &Entity, journal: &mut Vec<Undo>) {
        let props = entity.properties();
        let present: AHashSet<&str> = props.iter().map(|(k, _)| *k).collect();
        let stale: Vec<StrId> = self
            .nodes
            .columns
            .iter()
            .filter(|(prop, column)| {
                column.contains_key(&node) && !present.contains(self.interner.lookup(**prop))
            })
            .map(|(prop, _)| *prop)
            .collect();
        for prop in stale {
            let previous = self.nodes.set(node, prop, None);
            journal.push(Undo::PropSet {
                node,
                prop,
                previous,
            });
        }
        for (name, value) in props {
            self.set_prop(node, name, value, journal);
        }
    }

    fn add_node(&mut self, key: EntityKey, journal: &mut Vec<Undo>) -> u32 {
        let node = self.nodes.add(key.kind, key.id);
        journal.push(Undo::NodeAdded);
        self.set_prop(node, "id", PropValue::Int(key.id as i64), journal);
        node
    }

    fn check_unique(&self, key: EntityKey) -> Result<()> {
        if self.constraints.contains(&key.kind) && self.nodes.find(key).is_some() {
            return Err(StoreError::new(format!(
                "node already exists with label `{}` and property `id` = {}",
                key.kind, key.id
            )));
        }
        Ok(())
    }

    fn add_edge(&mut self, source: u32, target: u32, journal: &mut Vec<Undo>) {
        self.edges.add(source, target);
        journal.push(Undo::EdgeAdded);
    }

    fn undo(&mut self, journal: Vec<Undo>, vars: &mut AHashMap<u64, u32>) {
        for step in journal.into_iter().rev() {
            match step {
                Undo::NodeAdded => self.nodes.pop(),
                Undo::EdgeAdded => self.edges.pop(),
                Undo::PropSet {
                    node,
                    prop,
                    previous,
                } => {
                    self.nodes.set(node, prop, previous);
                }
                Undo::Bound { id, previous } => match previous {
                    Some(node) => {
                        vars.insert(id, node);
                    }
                    None => {
                        vars.remove(&id);
                    }
                },
            }
        }
    }

    fn apply(
        &mut self,
        command: &Command<'_>,
        vars: &mut AHashMap<u64, u32>,
        journal: &mut Vec<Undo>,
    ) -> Result<()> {
        match command {
            Command::CreateEntity(entity) => {
                if vars.contains_key(&entity.id) {
                    return Err(StoreError::new(format!(
                        "variable `{}` already declared",
                        entity.var()
                    )));
                }
                self.check_unique(entity.key())?;
                let node = self.add_node(entity.key(), journal);
                self.write_record(node, entity, journal);
                bind(vars, entity.id, node, journal);
            }
            Command::UpsertEntity(entity) => {
                let node = match vars.get(&entity.id).copied() {
                    Some(node) => node,
                    None => match self.nodes.find(entity.key()) {
                        Some(node) => node,
                        None => self.add_node(entity.key(), journal),
                    },
                };
                self.write_record(node, entity, journal);
                bind(vars, entity.id, node, journal);
            }
            Command::MergeParentStub(key) => {
                if !vars.contains_key(&key.id) {
                    let node = match self.nodes.find(*key) {
                        Some(node) => node,
                        None => self.add_node(*key, journal),
                    };
                    bind(vars, key.id, node, journal);
                }
            }
            Command::CreateEdge { parent, child } => {
                let (source, target) = (resolve(vars, parent)?, resolve(vars, child)?);
                self.add_edge(source, target, journal);
            }
            Command::MergeEdge { parent, child } => {
                let (source, target) = (resolve(vars, parent)?, resolve(vars, child)?);
                if !self.edges.has_edge(source, target) {
                    self.add_edge(source, target, journal);
                }
            }
            Command::BulkLoadRef { records, pass } => match pass {
                BulkPass::Create => {
                    for row in &records.rows {
                        self.check_unique(row.key())?;
                        let node = self.add_node(row.key(), journal);
                        self.write_record(node, row, journal);
                    }
                }
                BulkPass::Link => {
                    for row in &records.rows {
                        let Some(parent_id) = row.parent_id else {
                            continue;
                        };
                        // Rows whose record never loaded match nothing.
                        let Some(child) = self.nodes.find(row.key()) else {
                            continue;
                        };
                        let parent_key = EntityKey::directory(parent_id);
                        let parent = match self.nodes.find(parent_key) {
                            Some(node) => node,
                            None => self.add_node(parent_key, journal),
                        };
                        if !self.edges.has_edge(parent, child) {
                            self.add_edge(parent, child, journal);
                        }
                    }
                }
            },
        }
        Ok(())
    }
}

fn bind(vars: &mut AHashMap<u64, u32>, id: u64, node: u32, journal: &mut Vec<Undo>) {
    let previous = vars.insert(id, node);
    journal.push(Undo::Bound { id, previous });
}

fn resolve(vars: &AHashMap<u64, u32>, key: &EntityKey) -> Result<u32> {
    vars.get(&key.id)
        .copied()
        .ok_or_else(|| StoreError::new(format!("variable `{}` not defined", var_ref(key.id))))
}

/// A session over a [`MemoryGraph`]. Variable bindings live as long as the
/// session and are dropped with it.
pub struct MemorySession<'g> {
    graph: &'g mut MemoryGraph,
    vars: AHashMap<u64, u32>,
}

impl MemorySession<'_> {
    /// Number of variables currently bound in this session.
    pub fn bound(&self) -> usize {
        self.vars.len()
    }
}

impl StoreSession for MemorySession<'_> {
    fn execute(&mut self, batch: &Batch<'_>) -> Result<()> {
        self.graph.executes += 1;
        if self.graph.fail_on_execute == Some(self.graph.executes) {
            return Err(StoreError::new("injected failure"));
        }

        let mut journal = Vec::new();
        for command in &batch.commands {
            if let Err(err) = self.graph.apply(command, &mut self.vars, &mut journal) {
                debug!(error = %err, undone = journal.len(), "rolling back batch");
                self.graph.undo(journal, &mut self.vars);
                return Err(err);
            }
        }
        Ok(())
    }
}

impl GraphStore for MemoryGraph {
    type Session<'s> = MemorySession<'s>;

    fn open_session(&mut self) -> Result<Self::Session<'_>> {
        Ok(MemorySession {
            graph: self,
            vars: AHashMap::new(),
        })
    }

    fn reset_state(&mut self) -> Result<()> {
        let executes = self.executes;
        let fail_on_execute = self.fail_on_execute;
        *self = MemoryGraph::default();
        self.executes = executes;
        self.fail_on_execute = fail_on_execute;
        Ok(())
    }

    fn ensure_constraints(&mut self, kinds: &[EntityKind]) -> Result<()> {
        for &kind in kinds {
            if self.constraints.contains(&kind) {
                continue;
            }
            if let Some(((_, id), _)) = self
                .nodes
                .key_index
                .iter()
                .find(|((k, _), nodes)| *k == kind && nodes.len() > 1)
            {
                return Err(StoreError::new(format!(
                    "cannot create constraint on `{kind}`: duplicate id {id}"
                )));
            }
            self.constraints.insert(kind);
        }
        Ok(())
    }

    fn drop_constraints(&mut self, kinds: &[EntityKind]) -> Result<()> {
        for kind in kinds {
            self.constraints.remove(kind);
        }
        Ok(())
    }

    fn count_by_kind(&self) -> Result<KindCounts> {
        let count = |kind: EntityKind| {
            self.nodes
                .label_index
                .get(&kind)
                .map(|b| b.len() as usize)
                .unwrap_or(0)
        };
        Ok(KindCounts {
            directories: count(EntityKind::Directory),
            files: count(EntityKind::File),
        })
    }

    fn count_edges(&self) -> Result<usize> {
        Ok(self.edges.len())
    }
}
