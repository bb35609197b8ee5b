//! Dataflow graph produced by the trace compiler.
//!
//! Nodes live in a [`PrimaryMap`] and are identified by [`NodeRef`]s that
//! increase in creation order. Operands always refer to earlier nodes, so
//! the graph is acyclic by construction.

use std::collections::BTreeSet;
use std::fmt;

use cranelift_entity::{EntityRef, PrimaryMap, entity_impl};
use smallvec::SmallVec;

use crate::instruction::BinaryOperator;
use crate::namespace::GlobalValue;

/// Reference to a node in a [`TraceGraph`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeRef(u32);
entity_impl!(NodeRef, "n");

#[derive(Clone, Debug, PartialEq)]
pub enum NodeKind {
    /// Parameter in the given slot.
    Argument(u32),
    GlobalRef {
        name: String,
        value: GlobalValue,
    },
    /// Method looked up on the single operand. `target` is the receiver's
    /// value when it is a global.
    MethodRef {
        name: String,
        target: Option<GlobalValue>,
        native: bool,
    },
    BinaryOp(BinaryOperator),
    /// Call of `callee` with the operands as arguments, left to right.
    Call {
        callee: NodeRef,
        label: String,
        native: bool,
    },
    Return,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    pub operands: SmallVec<[NodeRef; 2]>,
}

impl Node {
    /// Operands plus, for calls, the callee.
    pub fn dependencies(&self) -> impl Iterator<Item = NodeRef> + '_ {
        let callee = match &self.kind {
            NodeKind::Call { callee, .. } => Some(*callee),
            _ => None,
        };
        callee.into_iter().chain(self.operands.iter().copied())
    }
}

/// A labeled call to a native-bound symbol.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NativeCall {
    pub node: NodeRef,
    pub label: String,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TraceGraph {
    nodes: PrimaryMap<NodeRef, Node>,
}

impl TraceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add(
        &mut self,
        kind: NodeKind,
        operands: impl IntoIterator<Item = NodeRef>,
    ) -> NodeRef {
        let operands: SmallVec<[NodeRef; 2]> = operands.into_iter().collect();
        debug_assert!(operands.iter().all(|op| op.index() < self.nodes.len()));
        self.nodes.push(Node { kind, operands })
    }

    pub fn node(&self, node: NodeRef) -> &Node {
        &self.nodes[node]
    }

    pub fn kind(&self, node: NodeRef) -> &NodeKind {
        &self.nodes[node].kind
    }

    pub fn operands(&self, node: NodeRef) -> &[NodeRef] {
        &self.nodes[node].operands
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes in creation order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeRef, &Node)> {
        self.nodes.iter()
    }

    /// Kahn's algorithm; among ready nodes the earliest created goes first.
    pub fn topological_order(&self) -> Vec<NodeRef> {
        let mut pending: Vec<usize> = vec![0; self.nodes.len()];
        let mut users: Vec<Vec<NodeRef>> = vec![Vec::new(); self.nodes.len()];
        for (node, data) in self.nodes.iter() {
            for dep in data.dependencies() {
                pending[node.index()] += 1;
                users[dep.index()].push(node);
            }
        }

        let mut ready: BTreeSet<NodeRef> = self
            .nodes
            .keys()
            .filter(|node| pending[node.index()] == 0)
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(node) = ready.pop_first() {
            order.push(node);
            for &user in &users[node.index()] {
                pending[user.index()] -= 1;
                if pending[user.index()] == 0 {
                    ready.insert(user);
                }
            }
        }
        debug_assert_eq!(order.len(), self.nodes.len(), "trace graph has a cycle");
        order
    }

    /// Calls whose callee resolved to a native-bound symbol.
    pub fn native_calls(&self) -> Vec<NativeCall> {
        self.nodes
            .iter()
            .filter_map(|(node, data)| match &data.kind {
                NodeKind::Call {
                    label, native: true, ..
                } => Some(NativeCall {
                    node,
                    label: label.clone(),
                }),
                _ => None,
            })
            .collect()
    }
}

impl fmt::Display for TraceGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (node, data) in self.nodes.iter() {
            write!(f, "%{node} = ")?;
            match &data.kind {
                NodeKind::Argument(slot) => write!(f, "arg {slot}")?,
                NodeKind::GlobalRef { name, value } => write!(f, "global @{name} = {value}")?,
                NodeKind::MethodRef { name, native, .. } => {
                    write!(f, "method .{name}")?;
                    if *native {
                        f.write_str(" [native]")?;
                    }
                }
                NodeKind::BinaryOp(op) => f.write_str(op.name())?,
                NodeKind::Call { callee, label, native } => {
                    write!(f, "call {label} via %{callee}")?;
                    if *native {
                        f.write_str(" [native]")?;
                    }
                }
                NodeKind::Return => f.write_str("return")?,
            }
            for (i, op) in data.operands.iter().enumerate() {
                let sep = if i == 0 { " " } else { ", " };
                write!(f, "{sep}%{op}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
