//! Networks of multi-function nodes, and their evaluation
//!
//! A [`Network`] is a graph of nodes connected by typed sockets.  Each
//! function node wraps a single [`MultiFunction`]; dummy nodes have no
//! function, and represent the boundary of the network (values provided by or
//! returned to the caller).
//!
//! ```
//! use multifn::{
//!     Context, IndexMask, MultiFunction, Network, NetworkEvaluator, Params,
//!     function::Si2So,
//!     types::{Column, DataType, ElementType, VArray},
//! };
//! use std::sync::Arc;
//!
//! let float = DataType::Single(ElementType::Float);
//! let mut net = Network::new();
//! let a = net.add_input("a", float);
//! let b = net.add_input("b", float);
//! let add = Si2So::new("add", |a: f32, b: f32| a + b);
//! let add = net.add_function(Arc::new(add));
//! let out = net.add_output("out", float);
//! net.add_link(a, net.node(add).input(0)).unwrap();
//! net.add_link(b, net.node(add).input(1)).unwrap();
//! net.add_link(net.node(add).output(0), out).unwrap();
//!
//! let eval =
//!     NetworkEvaluator::new(Arc::new(net), vec![a, b], vec![out]).unwrap();
//!
//! let a = Column::from(vec![1.0f32, 2.0, 3.0]);
//! let b = Column::from(vec![10.0f32]);
//! let mut c = Column::new(ElementType::Float, 3);
//! let mut params = Params::new();
//! params.add_readonly_single_input(VArray::Span(&a));
//! params.add_readonly_single_input(VArray::single(&b));
//! params.add_uninitialized_single_output(&mut c);
//! eval.call(&IndexMask::new(3), &mut params, &Context::new());
//! drop(params);
//!
//! assert_eq!(c.as_slice::<f32>(), &[11.0, 12.0, 13.0]);
//! ```
use crate::{
    Error, MultiFunction,
    function::Interface,
    index::{Index, IndexVec, define_index},
    types::DataType,
};
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

mod eval;
mod storage;

pub use eval::NetworkEvaluator;
pub use storage::{OutputSlot, ValueStorage};

define_index!(NodeId, "Index of a node in a [`Network`]");
define_index!(InputId, "Index of an input socket in a [`Network`]");
define_index!(OutputId, "Index of an output socket in a [`Network`]");

/// Sockets bound to one parameter of a function node
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ParamSocket {
    /// Input parameter
    Input(InputId),
    /// Output parameter
    Output(OutputId),
    /// Mutable parameter, which reads one socket and writes another
    Mutable(InputId, OutputId),
}

/// What a node does
#[derive(Clone)]
pub enum NodeKind {
    /// Calls a multi-function, with one [`ParamSocket`] per parameter
    Function {
        /// Function to call
        function: Arc<dyn MultiFunction>,
        /// Sockets, in parameter order
        params: Vec<ParamSocket>,
    },
    /// Placeholder for values provided by or returned to the caller
    Dummy,
}

/// A node in a [`Network`]
#[derive(Clone)]
pub struct Node {
    name: String,
    kind: NodeKind,
    inputs: Vec<InputId>,
    outputs: Vec<OutputId>,
}

impl Node {
    /// Returns the node's name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the node's kind
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Checks whether this is a dummy node
    pub fn is_dummy(&self) -> bool {
        matches!(self.kind, NodeKind::Dummy)
    }

    /// Returns the node's function, if this is a function node
    pub fn function(&self) -> Option<&Arc<dyn MultiFunction>> {
        match &self.kind {
            NodeKind::Function { function, .. } => Some(function),
            NodeKind::Dummy => None,
        }
    }

    /// Returns the input sockets, in order
    pub fn inputs(&self) -> &[InputId] {
        &self.inputs
    }

    /// Returns the output sockets, in order
    pub fn outputs(&self) -> &[OutputId] {
        &self.outputs
    }

    /// Returns the `i`'th input socket
    ///
    /// # Panics
    /// If the index is out of range
    pub fn input(&self, i: usize) -> InputId {
        self.inputs[i]
    }

    /// Returns the `i`'th output socket
    ///
    /// # Panics
    /// If the index is out of range
    pub fn output(&self, i: usize) -> OutputId {
        self.outputs[i]
    }

    /// Returns the input socket bound to the given parameter, if any
    pub fn input_for_param(&self, param: usize) -> Option<InputId> {
        match self.params()?.get(param)? {
            ParamSocket::Input(i) | ParamSocket::Mutable(i, _) => Some(*i),
            ParamSocket::Output(..) => None,
        }
    }

    /// Returns the output socket bound to the given parameter, if any
    pub fn output_for_param(&self, param: usize) -> Option<OutputId> {
        match self.params()?.get(param)? {
            ParamSocket::Output(o) | ParamSocket::Mutable(_, o) => Some(*o),
            ParamSocket::Input(..) => None,
        }
    }

    fn params(&self) -> Option<&[ParamSocket]> {
        match &self.kind {
            NodeKind::Function { params, .. } => Some(params),
            NodeKind::Dummy => None,
        }
    }
}

/// An input socket, which reads the value of at most one output socket
#[derive(Clone, Debug)]
pub struct InputSocket {
    node: NodeId,
    data_type: DataType,
    origin: Option<OutputId>,
}

impl InputSocket {
    /// Returns the node owning this socket
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Returns the socket's data type
    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// Returns the linked output socket
    pub fn origin(&self) -> Option<OutputId> {
        self.origin
    }
}

/// An output socket, which may be read by any number of input sockets
#[derive(Clone, Debug)]
pub struct OutputSocket {
    node: NodeId,
    data_type: DataType,
    targets: Vec<InputId>,
}

impl OutputSocket {
    /// Returns the node owning this socket
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Returns the socket's data type
    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// Returns every input socket linked to this output
    pub fn targets(&self) -> &[InputId] {
        &self.targets
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Graph of function and dummy nodes
#[derive(Clone, Default)]
pub struct Network {
    nodes: IndexVec<Node, NodeId>,
    inputs: IndexVec<InputSocket, InputId>,
    outputs: IndexVec<OutputSocket, OutputId>,
}

impl Network {
    /// Builds a new empty network
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a function node
    ///
    /// One input socket is created for every input and mutable parameter, and
    /// one output socket for every output and mutable parameter, in parameter
    /// order.
    pub fn add_function(
        &mut self,
        function: Arc<dyn MultiFunction>,
    ) -> NodeId {
        let node = NodeId::new(self.nodes.len());
        let mut inputs = vec![];
        let mut outputs = vec![];
        let mut params = vec![];
        for p in function.signature().params() {
            let t = p.ty.data_type;
            let s = match p.ty.interface {
                Interface::Input => {
                    let i = self.new_input(node, t);
                    inputs.push(i);
                    ParamSocket::Input(i)
                }
                Interface::Output => {
                    let o = self.new_output(node, t);
                    outputs.push(o);
                    ParamSocket::Output(o)
                }
                Interface::Mutable => {
                    let i = self.new_input(node, t);
                    let o = self.new_output(node, t);
                    inputs.push(i);
                    outputs.push(o);
                    ParamSocket::Mutable(i, o)
                }
            };
            params.push(s);
        }
        let name = function.signature().name().to_owned();
        self.nodes.push(Node {
            name,
            kind: NodeKind::Function { function, params },
            inputs,
            outputs,
        })
    }

    /// Adds a dummy node with the given sockets
    pub fn add_dummy(
        &mut self,
        name: impl Into<String>,
        input_types: &[DataType],
        output_types: &[DataType],
    ) -> NodeId {
        let node = NodeId::new(self.nodes.len());
        let inputs =
            input_types.iter().map(|t| self.new_input(node, *t)).collect();
        let outputs =
            output_types.iter().map(|t| self.new_output(node, *t)).collect();
        self.nodes.push(Node {
            name: name.into(),
            kind: NodeKind::Dummy,
            inputs,
            outputs,
        })
    }

    /// Adds a dummy node representing a value provided by the caller
    pub fn add_input(
        &mut self,
        name: impl Into<String>,
        ty: DataType,
    ) -> OutputId {
        let n = self.add_dummy(name, &[], &[ty]);
        self.nodes[n].outputs[0]
    }

    /// Adds a dummy node representing a value returned to the caller
    pub fn add_output(
        &mut self,
        name: impl Into<String>,
        ty: DataType,
    ) -> InputId {
        let n = self.add_dummy(name, &[ty], &[]);
        self.nodes[n].inputs[0]
    }

    fn new_input(&mut self, node: NodeId, data_type: DataType) -> InputId {
        self.inputs.push(InputSocket {
            node,
            data_type,
            origin: None,
        })
    }

    fn new_output(&mut self, node: NodeId, data_type: DataType) -> OutputId {
        self.outputs.push(OutputSocket {
            node,
            data_type,
            targets: vec![],
        })
    }

    /// Links an output socket to an input socket
    pub fn add_link(
        &mut self,
        from: OutputId,
        to: InputId,
    ) -> Result<(), Error> {
        let expected = self.outputs.get(from).ok_or(Error::BadOutput(from))?;
        let input = self.inputs.get(to).ok_or(Error::BadInput(to))?;
        if input.origin.is_some() {
            return Err(Error::AlreadyLinked(to));
        }
        if input.data_type != expected.data_type {
            return Err(Error::MismatchedTypes {
                expected: input.data_type,
                actual: expected.data_type,
            });
        }
        self.inputs[to].origin = Some(from);
        self.outputs[from].targets.push(to);
        Ok(())
    }

    /// Removes the link into an input socket, returning its previous origin
    pub fn remove_link(
        &mut self,
        to: InputId,
    ) -> Result<Option<OutputId>, Error> {
        let input = self.inputs.get_mut(to).ok_or(Error::BadInput(to))?;
        let prev = input.origin.take();
        if let Some(o) = prev {
            self.outputs[o].targets.retain(|t| *t != to);
        }
        Ok(prev)
    }

    /// Looks up a node
    ///
    /// # Panics
    /// If the node is not in this network
    pub fn node(&self, n: NodeId) -> &Node {
        &self.nodes[n]
    }

    /// Looks up an input socket
    ///
    /// # Panics
    /// If the socket is not in this network
    pub fn input(&self, i: InputId) -> &InputSocket {
        &self.inputs[i]
    }

    /// Looks up an output socket
    ///
    /// # Panics
    /// If the socket is not in this network
    pub fn output(&self, o: OutputId) -> &OutputSocket {
        &self.outputs[o]
    }

    /// Returns the node owning the given output socket
    pub fn output_node(&self, o: OutputId) -> &Node {
        &self.nodes[self.outputs[o].node]
    }

    /// Returns the node owning the given input socket
    pub fn input_node(&self, i: InputId) -> &Node {
        &self.nodes[self.inputs[i].node]
    }

    /// Iterates over every node id
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + use<> {
        self.nodes.keys()
    }

    /// Returns the number of nodes
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Returns the number of input sockets
    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    /// Returns the number of output sockets, which is the size of the id
    /// space used by [`ValueStorage`]
    pub fn output_count(&self) -> usize {
        self.outputs.len()
    }

    /// Returns every input socket transitively needed to compute the given
    /// sockets which has no origin
    pub fn find_unlinked_inputs(&self, sockets: &[InputId]) -> Vec<InputId> {
        let mut out = vec![];
        let mut seen = BTreeSet::new();
        let mut todo = sockets.to_vec();
        while let Some(i) = todo.pop() {
            let Some(origin) = self.inputs[i].origin else {
                out.push(i);
                continue;
            };
            let node = self.outputs[origin].node;
            if !self.nodes[node].is_dummy() && seen.insert(node) {
                todo.extend(self.nodes[node].inputs.iter().cloned());
            }
        }
        out.sort();
        out.dedup();
        out
    }

    /// Checks that every input socket needed to compute the given sockets
    /// is linked
    pub fn check_linked(&self, sockets: &[InputId]) -> Result<(), Error> {
        match self.find_unlinked_inputs(sockets).first() {
            Some(i) => Err(Error::UnlinkedInput(*i)),
            None => Ok(()),
        }
    }

    /// Checks that the network has no cycles
    pub fn check_acyclic(&self) -> Result<(), Error> {
        // Depth-first search on the heap, so that long chains of nodes don't
        // overflow the stack
        enum Action {
            Down,
            Up,
        }
        #[derive(Copy, Clone, Eq, PartialEq)]
        enum Mark {
            Visiting,
            Done,
        }
        let mut marks = BTreeMap::new();
        for root in self.nodes.keys() {
            let mut todo = vec![(Action::Down, root)];
            while let Some((action, node)) = todo.pop() {
                match action {
                    Action::Down => match marks.get(&node) {
                        Some(Mark::Done) => continue,
                        Some(Mark::Visiting) => return Err(Error::Cycle(node)),
                        None => {
                            marks.insert(node, Mark::Visiting);
                            todo.push((Action::Up, node));
                            todo.extend(
                                self.nodes[node]
                                    .inputs
                                    .iter()
                                    .filter_map(|i| self.inputs[*i].origin)
                                    .map(|o| {
                                        (Action::Down, self.outputs[o].node)
                                    }),
                            );
                        }
                    },
                    Action::Up => {
                        marks.insert(node, Mark::Done);
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        function::{Mutate, SiSo},
        types::ElementType,
    };

    const FLOAT: DataType = DataType::Single(ElementType::Float);

    fn negate() -> Arc<dyn MultiFunction> {
        Arc::new(SiSo::new("neg", |a: f32| -a))
    }

    #[test]
    fn function_sockets() {
        let mut net = Network::new();
        let f = net.add_function(negate());
        let m = net.add_function(Arc::new(Mutate::new("inc", |v: &mut i32| {
            *v += 1
        })));

        let n = net.node(f);
        assert_eq!(n.name(), "neg");
        assert!(!n.is_dummy());
        assert_eq!(n.inputs().len(), 1);
        assert_eq!(n.outputs().len(), 1);
        assert_eq!(n.input_for_param(0), Some(n.input(0)));
        assert_eq!(n.input_for_param(1), None);
        assert_eq!(n.output_for_param(1), Some(n.output(0)));

        let n = net.node(m);
        assert_eq!(n.input_for_param(0), Some(n.input(0)));
        assert_eq!(n.output_for_param(0), Some(n.output(0)));
        assert_eq!(
            net.input(n.input(0)).data_type(),
            DataType::Single(ElementType::Int)
        );
        assert_eq!(net.output_count(), 2);
        assert_eq!(net.input_count(), 2);
    }

    #[test]
    fn links() {
        let mut net = Network::new();
        let a = net.add_input("a", FLOAT);
        let i = net.add_input("i", DataType::Single(ElementType::Int));
        let f = net.add_function(negate());
        let fi = net.node(f).input(0);

        assert_eq!(
            net.add_link(i, fi),
            Err(Error::MismatchedTypes {
                expected: FLOAT,
                actual: DataType::Single(ElementType::Int)
            })
        );
        net.add_link(a, fi).unwrap();
        assert_eq!(net.add_link(a, fi), Err(Error::AlreadyLinked(fi)));
        assert_eq!(net.input(fi).origin(), Some(a));
        assert_eq!(net.output(a).targets(), &[fi]);

        assert_eq!(net.remove_link(fi), Ok(Some(a)));
        assert!(net.output(a).targets().is_empty());
        assert_eq!(net.remove_link(fi), Ok(None));
        assert!(net.output_node(a).is_dummy());
        assert_eq!(net.input_node(fi).name(), "neg");
    }

    #[test]
    fn unlinked_inputs() {
        let mut net = Network::new();
        let a = net.add_input("a", FLOAT);
        let f = net.add_function(negate());
        let g = net.add_function(negate());
        let out = net.add_output("out", FLOAT);
        let other = net.add_output("other", FLOAT);
        net.add_link(net.node(f).output(0), net.node(g).input(0))
            .unwrap();
        net.add_link(net.node(g).output(0), out).unwrap();
        net.add_link(a, other).unwrap();

        let fi = net.node(f).input(0);
        assert_eq!(net.find_unlinked_inputs(&[out]), vec![fi]);
        assert_eq!(net.check_linked(&[out]), Err(Error::UnlinkedInput(fi)));
        assert_eq!(net.check_linked(&[other]), Ok(()));

        net.add_link(a, fi).unwrap();
        assert_eq!(net.check_linked(&[out, other]), Ok(()));
    }

    #[test]
    fn cycles() {
        let mut net = Network::new();
        let f = net.add_function(negate());
        let g = net.add_function(negate());
        net.add_link(net.node(f).output(0), net.node(g).input(0))
            .unwrap();
        assert_eq!(net.check_acyclic(), Ok(()));
        net.add_link(net.node(g).output(0), net.node(f).input(0))
            .unwrap();
        assert!(matches!(net.check_acyclic(), Err(Error::Cycle(..))));
    }

    #[test]
    fn diamond_is_acyclic() {
        let mut net = Network::new();
        let a = net.add_input("a", FLOAT);
        let add = net.add_function(Arc::new(crate::function::Si2So::new(
            "add",
            |a: f32, b: f32| a + b,
        )));
        let f = net.add_function(negate());
        net.add_link(a, net.node(f).input(0)).unwrap();
        net.add_link(net.node(f).output(0), net.node(add).input(0))
            .unwrap();
        net.add_link(net.node(f).output(0), net.node(add).input(1))
            .unwrap();
        assert_eq!(net.check_acyclic(), Ok(()));
    }
}
