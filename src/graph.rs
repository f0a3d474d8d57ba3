//! Insert ordering for models linked by foreign keys.
//!
//! A model can only be inserted after every model it references. Models
//! declare their references through [`Model::foreign_keys`]; the graph then
//! answers "in which order do I insert `Order` and everything it needs?".
//!
//! ```
//! use promise_kit::{DependencyGraph, ForeignKey, Model};
//!
//! struct Customer;
//! impl Model for Customer {
//!     const TABLE: &'static str = "customer";
//! }
//!
//! struct Order;
//! impl Model for Order {
//!     const TABLE: &'static str = "order";
//!     fn foreign_keys() -> Vec<ForeignKey> {
//!         vec![ForeignKey::to::<Customer>("customer_id")]
//!     }
//! }
//!
//! let mut graph = DependencyGraph::new();
//! graph.register::<Customer>().register::<Order>();
//! assert_eq!(graph.insert_order::<Order>().unwrap(), ["customer", "order"]);
//! ```

use std::collections::{HashMap, HashSet};

use crate::error::GraphError;

/// A persisted type and the tables it references.
pub trait Model: 'static {
    const TABLE: &'static str;

    fn foreign_keys() -> Vec<ForeignKey> {
        Vec::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ForeignKey {
    pub column: &'static str,
    pub target: &'static str,
}

impl ForeignKey {
    /// A reference from `column` to `M`'s table.
    pub fn to<M: Model>(column: &'static str) -> Self {
        Self {
            column,
            target: M::TABLE,
        }
    }

    pub fn new(column: &'static str, target: &'static str) -> Self {
        Self { column, target }
    }
}

#[derive(Debug, Clone)]
struct Node {
    table: &'static str,
    foreign_keys: Vec<ForeignKey>,
}

#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: Vec<Node>,
    index: HashMap<&'static str, usize>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<M: Model>(&mut self) -> &mut Self {
        self.register_table(M::TABLE, M::foreign_keys())
    }

    /// Register by name. Registering a table again replaces its keys.
    pub fn register_table(
        &mut self,
        table: &'static str,
        foreign_keys: Vec<ForeignKey>,
    ) -> &mut Self {
        let node = Node {
            table,
            foreign_keys,
        };
        match self.index.get(table) {
            Some(&i) => self.nodes[i] = node,
            None => {
                self.index.insert(table, self.nodes.len());
                self.nodes.push(node);
            }
        }
        self
    }

    pub fn contains(&self, table: &str) -> bool {
        self.index.contains_key(table)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Registered tables `table` references directly, in declaration order.
    /// Self-references and references to unregistered tables are skipped.
    pub fn dependencies(&self, table: &str) -> Result<Vec<&'static str>, GraphError> {
        let i = self.lookup(table)?;
        Ok(self.edges(i).map(|j| self.nodes[j].table).collect())
    }

    pub fn insert_order<M: Model>(&self) -> Result<Vec<&'static str>, GraphError> {
        self.insert_order_of(M::TABLE)
    }

    /// `table` and everything it transitively references, dependencies
    /// first and `table` last, without duplicates.
    pub fn insert_order_of(&self, table: &str) -> Result<Vec<&'static str>, GraphError> {
        let start = self.lookup(table)?;
        let mut walk = Walk::new(self.nodes.len());
        self.visit(start, &mut walk)?;
        Ok(walk.into_order(self))
    }

    /// Every registered table. Independent tables keep registration order.
    pub fn insert_order_all(&self) -> Result<Vec<&'static str>, GraphError> {
        let mut walk = Walk::new(self.nodes.len());
        for i in 0..self.nodes.len() {
            self.visit(i, &mut walk)?;
        }
        Ok(walk.into_order(self))
    }

    fn lookup(&self, table: &str) -> Result<usize, GraphError> {
        self.index
            .get(table)
            .copied()
            .ok_or_else(|| GraphError::UnknownModel(table.to_owned()))
    }

    fn edges(&self, i: usize) -> impl Iterator<Item = usize> + '_ {
        let mut seen = HashSet::new();
        self.nodes[i]
            .foreign_keys
            .iter()
            .filter_map(|fk| self.index.get(fk.target).copied())
            .filter(move |&j| j != i && seen.insert(j))
    }

    /// Depth-first post-order. `path` holds the nodes on the current branch;
    /// meeting one again means a cycle.
    fn visit(&self, i: usize, walk: &mut Walk) -> Result<(), GraphError> {
        if walk.done[i] {
            return Ok(());
        }
        if let Some(pos) = walk.path.iter().position(|&p| p == i) {
            let mut path: Vec<_> = walk.path[pos..].iter().map(|&p| self.nodes[p].table).collect();
            path.push(self.nodes[i].table);
            return Err(GraphError::Cycle { path });
        }

        walk.path.push(i);
        for j in self.edges(i) {
            self.visit(j, walk)?;
        }
        walk.path.pop();

        walk.done[i] = true;
        walk.order.push(i);
        Ok(())
    }
}

struct Walk {
    done: Vec<bool>,
    path: Vec<usize>,
    order: Vec<usize>,
}

impl Walk {
    fn new(n: usize) -> Self {
        Self {
            done: vec![false; n],
            path: Vec::new(),
            order: Vec::with_capacity(n),
        }
    }

    fn into_order(self, graph: &DependencyGraph) -> Vec<&'static str> {
        self.order.into_iter().map(|i| graph.nodes[i].table).collect()
    }
}
