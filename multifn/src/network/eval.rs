use super::{
    InputId, Network, Node, NodeId, NodeKind, OutputId, ParamSocket,
    ValueStorage,
};
use crate::{
    Context, Error, IndexMask, MultiFunction, Params,
    function::{Interface, Param, ParamType, Signature},
    types::DataType,
};
use log::{debug, trace};
use std::{collections::BTreeSet, sync::Arc};

/// Evaluates a subset of a [`Network`] as a single multi-function
///
/// The evaluator's parameters are the network inputs (output sockets of dummy
/// nodes, bound to caller data), followed by the network outputs (input
/// sockets of dummy nodes, which are written to caller buffers).  Only nodes
/// needed to compute the outputs are called, and each at most once per call.
///
/// When every input of a node is the same at every index, the node is called
/// once on a single index and its result is shared by every index.
pub struct NetworkEvaluator {
    network: Arc<Network>,
    inputs: Vec<OutputId>,
    outputs: Vec<InputId>,
    signature: Signature,
    depends_on_context: bool,
}

impl NetworkEvaluator {
    /// Builds a new evaluator
    ///
    /// Returns an error if any socket doesn't belong to a dummy node, if any
    /// socket needed to compute the outputs isn't linked or bound to an
    /// input, or if the network has a cycle.
    pub fn new(
        network: Arc<Network>,
        inputs: Vec<OutputId>,
        outputs: Vec<InputId>,
    ) -> Result<Self, Error> {
        let mut signature = Signature::new("Network");
        let mut bound = BTreeSet::new();
        for &o in &inputs {
            if o.index() >= network.output_count() {
                return Err(Error::BadOutput(o));
            }
            let socket = network.output(o);
            if !network.node(socket.node()).is_dummy() {
                return Err(Error::NotADummy(socket.node()));
            }
            if !bound.insert(o) {
                return Err(Error::DuplicateInput(o));
            }
            signature.push(
                network.node(socket.node()).name(),
                ParamType::new(Interface::Input, socket.data_type()),
            );
        }
        for &i in &outputs {
            if i.index() >= network.input_count() {
                return Err(Error::BadInput(i));
            }
            let socket = network.input(i);
            if !network.node(socket.node()).is_dummy() {
                return Err(Error::NotADummy(socket.node()));
            }
            signature.push(
                network.node(socket.node()).name(),
                ParamType::new(Interface::Output, socket.data_type()),
            );
        }
        network.check_linked(&outputs)?;
        network.check_acyclic()?;

        // Every dummy output that we can reach must be provided by the caller
        let mut depends_on_context = false;
        let mut seen = BTreeSet::new();
        let mut todo = outputs
            .iter()
            .filter_map(|i| network.input(*i).origin())
            .collect::<Vec<_>>();
        while let Some(o) = todo.pop() {
            let node = network.output(o).node();
            let n = network.node(node);
            match n.function() {
                None => {
                    if !bound.contains(&o) {
                        return Err(Error::UnboundInput(o));
                    }
                }
                Some(f) => {
                    if seen.insert(node) {
                        depends_on_context |= f.depends_on_context();
                        todo.extend(
                            n.inputs()
                                .iter()
                                .filter_map(|i| network.input(*i).origin()),
                        );
                    }
                }
            }
        }

        Ok(Self {
            network,
            inputs,
            outputs,
            signature,
            depends_on_context,
        })
    }

    /// Returns the network being evaluated
    pub fn network(&self) -> &Network {
        &self.network
    }

    fn origin(&self, input: InputId) -> OutputId {
        self.network
            .input(input)
            .origin()
            .unwrap_or_else(|| panic!("{input} is not linked"))
    }

    /// Computes the value of every requested output's origin
    ///
    /// This is a depth-first traversal using a heap-allocated stack, so that
    /// long chains of nodes can't overflow the call stack.  A socket stays on
    /// the stack until its node has been called; its dependencies are pushed
    /// above it, and it is revisited once they're computed.
    fn compute(&self, storage: &mut ValueStorage<'_>, ctx: &Context) {
        let network = &*self.network;
        let mut stack = self
            .outputs
            .iter()
            .map(|i| self.origin(*i))
            .collect::<Vec<_>>();
        while let Some(&socket) = stack.last() {
            if storage.socket_is_computed(socket) {
                stack.pop();
                continue;
            }
            let node = network.output(socket).node();
            let n = network.node(node);
            assert!(!n.is_dummy(), "{socket} belongs to a dummy node");

            let mut missing = false;
            for &i in n.inputs() {
                let origin = self.origin(i);
                if !storage.socket_is_computed(origin) {
                    stack.push(origin);
                    missing = true;
                }
            }
            if !missing {
                self.evaluate_node(storage, node, ctx);
                stack.pop();
            }
        }
    }

    fn can_do_single_value_evaluation(
        &self,
        storage: &ValueStorage<'_>,
        node: &Node,
        function: &dyn MultiFunction,
    ) -> bool {
        !function.depends_on_context()
            && node.inputs().iter().all(|i| {
                storage.is_same_value_for_every_index(self.origin(*i))
            })
    }

    fn evaluate_node(
        &self,
        storage: &mut ValueStorage<'_>,
        node: NodeId,
        ctx: &Context,
    ) {
        let network = &*self.network;
        let n = network.node(node);
        let NodeKind::Function {
            function,
            params: sockets,
        } = n.kind()
        else {
            unreachable!("dummy nodes are never evaluated");
        };

        let one = IndexMask::new(1);
        let single =
            self.can_do_single_value_evaluation(storage, n, function.as_ref());
        let mask = if single { &one } else { storage.mask() };
        if single {
            trace!("single-value evaluation of {} ({node})", n.name());
        } else {
            trace!("calling {} ({node}) over {} indices", n.name(), mask.len());
        }

        // Prepare every output buffer before borrowing the inputs
        let mut slots = Vec::with_capacity(n.outputs().len());
        for s in sockets {
            let slot = match *s {
                ParamSocket::Input(..) => continue,
                ParamSocket::Output(o) => {
                    match (network.output(o).data_type(), single) {
                        (DataType::Single(..), false) => {
                            storage.get_single_output_full(o)
                        }
                        (DataType::Single(..), true) => {
                            storage.get_single_output_single(o)
                        }
                        (DataType::Vector(..), false) => {
                            storage.get_vector_output_full(o)
                        }
                        (DataType::Vector(..), true) => {
                            storage.get_vector_output_single(o)
                        }
                    }
                }
                ParamSocket::Mutable(i, o) => {
                    match (network.output(o).data_type(), single) {
                        (DataType::Single(..), false) => {
                            storage.get_mutable_single_full(i, o)
                        }
                        (DataType::Single(..), true) => {
                            storage.get_mutable_single_single(i, o)
                        }
                        (DataType::Vector(..), false) => {
                            storage.get_mutable_vector_full(i, o)
                        }
                        (DataType::Vector(..), true) => {
                            storage.get_mutable_vector_single(i, o)
                        }
                    }
                }
            };
            slots.push(slot);
        }

        {
            let storage = &*storage;
            let mut params = Params::with_capacity(sockets.len());
            let mut slots = slots.iter_mut();
            for s in sockets {
                match *s {
                    ParamSocket::Input(i) => {
                        match (network.input(i).data_type(), single) {
                            (DataType::Single(..), false) => params
                                .add_readonly_single_input(
                                    storage.get_single_input_full(i),
                                ),
                            (DataType::Single(..), true) => params
                                .add_readonly_single_input(
                                    storage.get_single_input_single(i),
                                ),
                            (DataType::Vector(..), false) => params
                                .add_readonly_vector_input(
                                    storage.get_vector_input_full(i),
                                ),
                            (DataType::Vector(..), true) => params
                                .add_readonly_vector_input(
                                    storage.get_vector_input_single(i),
                                ),
                        }
                    }
                    ParamSocket::Output(o) | ParamSocket::Mutable(_, o) => {
                        let Some(slot) = slots.next() else {
                            unreachable!("missing slot for {o}");
                        };
                        let is_mutable = matches!(s, ParamSocket::Mutable(..));
                        match (network.output(o).data_type(), is_mutable) {
                            (DataType::Single(..), false) => {
                                params.add_uninitialized_single_output(
                                    slot.column(),
                                )
                            }
                            (DataType::Single(..), true) => {
                                params.add_single_mutable(slot.column())
                            }
                            (DataType::Vector(..), false) => {
                                params.add_vector_output(slot.vector())
                            }
                            (DataType::Vector(..), true) => {
                                params.add_vector_mutable(slot.vector())
                            }
                        }
                    }
                }
            }
            function.call(mask, &mut params, ctx);
        }

        for slot in slots {
            storage.restore(slot);
        }
        storage.finish_node(node);
    }
}

impl MultiFunction for NetworkEvaluator {
    fn signature(&self) -> &Signature {
        &self.signature
    }

    fn call(&self, mask: &IndexMask, params: &mut Params<'_>, ctx: &Context) {
        if mask.is_empty() {
            return;
        }
        debug_assert_eq!(params.check(&self.signature), Ok(()));
        debug!(
            "evaluating network with {} outputs over {} indices",
            self.outputs.len(),
            mask.len()
        );

        let network = &*self.network;
        let mut storage = ValueStorage::new(network, mask);
        let mut params = params.iter_mut();

        for &socket in &self.inputs {
            match params.next() {
                Some(Param::SingleInput(v)) => {
                    storage.add_single_input_from_caller(socket, *v)
                }
                Some(Param::VectorInput(v)) => {
                    storage.add_vector_input_from_caller(socket, *v)
                }
                p => panic!("invalid parameter for {socket}: {p:?}"),
            }
        }

        // Outputs which alias a network input, or share an origin with an
        // earlier output, are copied once everything else is done
        let mut deferred = vec![];
        for &socket in &self.outputs {
            let Some(param) = params.next() else {
                panic!("missing parameter for {socket}");
            };
            let origin = self.origin(socket);
            if network.output_node(origin).is_dummy()
                || storage.socket_has_buffer_for_output(origin)
            {
                deferred.push((socket, param));
                continue;
            }
            match param {
                Param::SingleOutput(c) => {
                    storage.add_single_output_from_caller(origin, c)
                }
                Param::IgnoredSingle(c) => {
                    storage.add_single_output_from_caller(origin, c)
                }
                Param::VectorOutput(c) => {
                    storage.add_vector_output_from_caller(origin, c)
                }
                Param::IgnoredVector(c) => {
                    storage.add_vector_output_from_caller(origin, c)
                }
                p => panic!("invalid parameter for {socket}: {p:?}"),
            }
        }

        self.compute(&mut storage, ctx);

        for (socket, param) in deferred {
            match param {
                Param::SingleOutput(c) => {
                    c.materialize(mask, storage.get_single_input_full(socket))
                }
                Param::VectorOutput(c) => {
                    c.extend(mask, storage.get_vector_input_full(socket))
                }
                Param::IgnoredSingle(..) | Param::IgnoredVector(..) => (),
                p => panic!("invalid parameter for {socket}: {p:?}"),
            }
        }
        trace!(
            "network evaluation allocated {} buffers; {} still owned",
            storage.pool().allocated(),
            storage.owned_values()
        );
    }

    fn depends_on_context(&self) -> bool {
        self.depends_on_context
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        function::{Counted, ElementIndex, Mutate, Si2So, SiSo, VectorAppend},
        types::{Column, ElementType, VArray, VVectorArray, VectorColumn},
    };

    const INT: DataType = DataType::Single(ElementType::Int);
    const INTS: DataType = DataType::Vector(ElementType::Int);

    #[test]
    fn construction_errors() {
        let mut net = Network::new();
        let a = net.add_input("a", INT);
        let unbound = net.add_input("b", INT);
        let f = net.add_function(Arc::new(SiSo::new("inc", |a: i32| a + 1)));
        let out = net.add_output("out", INT);
        let fo = net.node(f).output(0);
        net.add_link(fo, out).unwrap();
        let net = Arc::new(net);

        let fi = net.node(f).input(0);
        assert!(matches!(
            NetworkEvaluator::new(net.clone(), vec![a], vec![out]),
            Err(Error::UnlinkedInput(i)) if i == fi
        ));
        assert!(matches!(
            NetworkEvaluator::new(net.clone(), vec![fo], vec![out]),
            Err(Error::NotADummy(n)) if n == f
        ));
        assert!(matches!(
            NetworkEvaluator::new(net.clone(), vec![a, a], vec![]),
            Err(Error::DuplicateInput(..))
        ));

        let mut net = (*net).clone();
        net.add_link(unbound, fi).unwrap();
        let net = Arc::new(net);
        assert!(matches!(
            NetworkEvaluator::new(net.clone(), vec![a], vec![out]),
            Err(Error::UnboundInput(o)) if o == unbound
        ));
        let eval =
            NetworkEvaluator::new(net, vec![a, unbound], vec![out]).unwrap();
        assert_eq!(eval.signature().len(), 3);
        assert!(!eval.depends_on_context());
    }

    #[test]
    fn pass_through_and_shared_outputs() {
        let mut net = Network::new();
        let a = net.add_input("a", INT);
        let f = net.add_function(Arc::new(SiSo::new("double", |a: i32| a * 2)));
        let out1 = net.add_output("out1", INT);
        let out2 = net.add_output("out2", INT);
        let same = net.add_output("same", INT);
        net.add_link(a, net.node(f).input(0)).unwrap();
        net.add_link(net.node(f).output(0), out1).unwrap();
        net.add_link(net.node(f).output(0), out2).unwrap();
        net.add_link(a, same).unwrap();
        let eval = NetworkEvaluator::new(
            Arc::new(net),
            vec![a],
            vec![out1, out2, same],
        )
        .unwrap();

        let data = Column::from(vec![1i32, 2, 3, 4]);
        let mut o1 = Column::new(ElementType::Int, 4);
        let mut o2 = Column::new(ElementType::Int, 4);
        let mut o3 = Column::new(ElementType::Int, 4);
        let mut params = Params::new();
        params.add_readonly_single_input(VArray::Span(&data));
        params.add_uninitialized_single_output(&mut o1);
        params.add_uninitialized_single_output(&mut o2);
        params.add_uninitialized_single_output(&mut o3);
        let mask = IndexMask::from_indices(vec![0, 1, 3]);
        eval.call(&mask, &mut params, &Context::new());
        drop(params);

        assert_eq!(o1.as_slice::<i32>(), &[2, 4, 0, 8]);
        assert_eq!(o2.as_slice::<i32>(), &[2, 4, 0, 8]);
        assert_eq!(o3.as_slice::<i32>(), &[1, 2, 0, 4]);
    }

    #[test]
    fn mutable_chain() {
        // a -> inc -> inc -> add(_, a) -> out
        let mut net = Network::new();
        let a = net.add_input("a", INT);
        let inc1 = net
            .add_function(Arc::new(Mutate::new("inc", |v: &mut i32| *v += 1)));
        let inc2 = net
            .add_function(Arc::new(Mutate::new("inc", |v: &mut i32| *v += 1)));
        let add = net.add_function(Arc::new(Si2So::new(
            "add",
            |a: i32, b: i32| a + b,
        )));
        let out = net.add_output("out", INT);
        net.add_link(a, net.node(inc1).input(0)).unwrap();
        net.add_link(net.node(inc1).output(0), net.node(inc2).input(0))
            .unwrap();
        net.add_link(net.node(inc2).output(0), net.node(add).input(0))
            .unwrap();
        net.add_link(a, net.node(add).input(1)).unwrap();
        net.add_link(net.node(add).output(0), out).unwrap();
        let eval =
            NetworkEvaluator::new(Arc::new(net), vec![a], vec![out]).unwrap();

        let data = Column::from(vec![10i32, 20, 30]);
        let mut result = Column::new(ElementType::Int, 3);
        let mut params = Params::new();
        params.add_readonly_single_input(VArray::Span(&data));
        params.add_uninitialized_single_output(&mut result);
        eval.call(&IndexMask::new(3), &mut params, &Context::new());
        drop(params);

        // The caller's input is never modified in place
        assert_eq!(data.as_slice::<i32>(), &[10, 20, 30]);
        assert_eq!(result.as_slice::<i32>(), &[22, 42, 62]);
    }

    #[test]
    fn context_dependent_nodes_are_not_broadcast() {
        let mut net = Network::new();
        let index = net.add_function(Arc::new(ElementIndex::new()));
        let f = Arc::new(Counted::new(SiSo::new("neg", |a: i32| -a)));
        let neg = net.add_function(f.clone());
        let out = net.add_output("out", INT);
        net.add_link(net.node(index).output(0), net.node(neg).input(0))
            .unwrap();
        net.add_link(net.node(neg).output(0), out).unwrap();
        let eval =
            NetworkEvaluator::new(Arc::new(net), vec![], vec![out]).unwrap();
        assert!(eval.depends_on_context());

        let mut result = Column::new(ElementType::Int, 3);
        let mut params = Params::new();
        params.add_uninitialized_single_output(&mut result);
        eval.call(&IndexMask::new(3), &mut params, &Context::new());
        drop(params);
        assert_eq!(result.as_slice::<i32>(), &[0, -1, -2]);
        assert_eq!(f.indices(), 3);
    }

    #[test]
    fn vector_mutable() {
        let mut net = Network::new();
        let v = net.add_input("v", INTS);
        let x = net.add_input("x", INT);
        let append = net.add_function(Arc::new(VectorAppend::<i32>::new()));
        let out = net.add_output("out", INTS);
        net.add_link(v, net.node(append).input(0)).unwrap();
        net.add_link(x, net.node(append).input(1)).unwrap();
        net.add_link(net.node(append).output(0), out).unwrap();
        let eval = NetworkEvaluator::new(Arc::new(net), vec![v, x], vec![out])
            .unwrap();

        let vs = VectorColumn::from(vec![vec![1i32], vec![2, 3]]);
        let xs = Column::from(vec![7i32]);
        let mut result = VectorColumn::new(ElementType::Int, 2);
        let mut params = Params::new();
        params.add_readonly_vector_input(VVectorArray::Span(&vs));
        params.add_readonly_single_input(VArray::single(&xs));
        params.add_vector_output(&mut result);
        eval.call(&IndexMask::new(2), &mut params, &Context::new());
        drop(params);
        assert_eq!(result.as_vectors::<i32>(), &[vec![1, 7], vec![2, 3, 7]]);
    }

    #[test]
    fn empty_mask() {
        let mut net = Network::new();
        let f = Arc::new(Counted::new(SiSo::new("neg", |a: i32| -a)));
        let a = net.add_input("a", INT);
        let neg = net.add_function(f.clone());
        let out = net.add_output("out", INT);
        net.add_link(a, net.node(neg).input(0)).unwrap();
        net.add_link(net.node(neg).output(0), out).unwrap();
        let eval =
            NetworkEvaluator::new(Arc::new(net), vec![a], vec![out]).unwrap();

        let data = Column::from(vec![1i32]);
        let mut result = Column::new(ElementType::Int, 0);
        let mut params = Params::new();
        params.add_readonly_single_input(VArray::single(&data));
        params.add_uninitialized_single_output(&mut result);
        eval.call(&IndexMask::default(), &mut params, &Context::new());
        assert_eq!(f.calls(), 0);
    }
}
