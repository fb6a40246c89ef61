//! Per-call storage for the values of output sockets
use super::{InputId, Network, OutputId};
use crate::{
    BufferPool, IndexMask,
    index::IndexVec,
    types::{Column, DataType, VArray, VVectorArray, VectorColumn},
};
use log::trace;

/// Value bound to one output socket
enum Value<'a> {
    /// Read-only data provided by the caller
    InputSingle(VArray<'a>),
    /// Read-only vector data provided by the caller
    InputVector(VVectorArray<'a>),
    /// Buffer provided by the caller, filled by the socket's node
    OutputSingle {
        column: &'a mut Column,
        is_computed: bool,
    },
    /// Vector buffer provided by the caller, filled by the socket's node
    OutputVector {
        column: &'a mut VectorColumn,
        is_computed: bool,
    },
    /// Intermediate buffer owned by the storage
    OwnSingle {
        column: Column,
        /// Number of input sockets which may still read this value
        max_remaining_users: usize,
        /// The buffer holds one value, which is shared by every index
        is_single_allocation: bool,
    },
    /// Intermediate vector buffer owned by the storage
    OwnVector {
        column: VectorColumn,
        max_remaining_users: usize,
        is_single_allocation: bool,
    },
}

impl Value<'_> {
    fn kind(&self) -> &'static str {
        match self {
            Value::InputSingle(..) => "InputSingle",
            Value::InputVector(..) => "InputVector",
            Value::OutputSingle { .. } => "OutputSingle",
            Value::OutputVector { .. } => "OutputVector",
            Value::OwnSingle { .. } => "OwnSingle",
            Value::OwnVector { .. } => "OwnVector",
        }
    }
}

/// Writable buffer lent out of a [`ValueStorage`] while its node is called
///
/// Slots are returned with [`ValueStorage::restore`] once the call finishes.
pub struct OutputSlot<'a> {
    socket: OutputId,
    value: Value<'a>,
    /// Caller buffer which receives a one-value result on restore
    broadcast_to: Option<Value<'a>>,
}

impl OutputSlot<'_> {
    /// Returns the output socket that this slot belongs to
    pub fn socket(&self) -> OutputId {
        self.socket
    }

    /// Borrows the single-value buffer
    ///
    /// # Panics
    /// If the slot holds a vector buffer
    pub fn column(&mut self) -> &mut Column {
        match &mut self.value {
            Value::OutputSingle { column, .. } => &mut **column,
            Value::OwnSingle { column, .. } => column,
            v => panic!("{} is not a single-value buffer", v.kind()),
        }
    }

    /// Borrows the vector buffer
    ///
    /// # Panics
    /// If the slot holds a single-value buffer
    pub fn vector(&mut self) -> &mut VectorColumn {
        match &mut self.value {
            Value::OutputVector { column, .. } => &mut **column,
            Value::OwnVector { column, .. } => column,
            v => panic!("{} is not a vector buffer", v.kind()),
        }
    }
}

/// Values of output sockets during a single network evaluation
///
/// Each output socket holds at most one value.  Values are either provided by
/// the caller (inputs to the network, or buffers for its outputs), or owned by
/// the storage; owned values track how many input sockets may still read them,
/// and are released to a [`BufferPool`] once that count reaches zero.
///
/// Output buffers are lent out of the storage as an [`OutputSlot`] while their
/// node is called, then put back with [`restore`](Self::restore).  This lets
/// a node read its inputs from the storage while writing its outputs.
///
/// The `_full` accessors work with one value per index in the storage's mask;
/// the `_single` accessors work with a single value which is shared by every
/// index, and are only valid when every input of the node is the same at every
/// index (see [`is_same_value_for_every_index`]).
///
/// Breaking any precondition is a bug in the caller, and panics.
///
/// [`is_same_value_for_every_index`]: Self::is_same_value_for_every_index
pub struct ValueStorage<'a> {
    network: &'a Network,
    mask: &'a IndexMask,
    values: IndexVec<Option<Value<'a>>, OutputId>,
    pool: BufferPool,
}

impl<'a> ValueStorage<'a> {
    /// Builds empty storage for every output socket in the network
    pub fn new(network: &'a Network, mask: &'a IndexMask) -> Self {
        let values =
            std::iter::repeat_with(|| None).take(network.output_count());
        Self {
            network,
            mask,
            values: values.collect(),
            pool: BufferPool::new(),
        }
    }

    /// Returns the mask over which values are stored
    pub fn mask(&self) -> &'a IndexMask {
        self.mask
    }

    /// Returns the pool of spare buffers
    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    /// Returns the number of buffers currently owned by the storage
    pub fn owned_values(&self) -> usize {
        self.values
            .iter()
            .flatten()
            .filter(|v| {
                matches!(v, Value::OwnSingle { .. } | Value::OwnVector { .. })
            })
            .count()
    }

    fn bind(&mut self, socket: OutputId, value: Value<'a>) {
        let slot = &mut self.values[socket];
        assert!(slot.is_none(), "{socket} is already bound");
        *slot = Some(value);
    }

    fn origin(&self, input: InputId) -> OutputId {
        self.network
            .input(input)
            .origin()
            .unwrap_or_else(|| panic!("{input} is not linked"))
    }

    fn users(&self, socket: OutputId) -> usize {
        self.network.output(socket).targets().len()
    }

    fn data_type(&self, socket: OutputId) -> DataType {
        self.network.output(socket).data_type()
    }

    fn value(&self, socket: OutputId) -> &Value<'a> {
        self.values[socket]
            .as_ref()
            .unwrap_or_else(|| panic!("{socket} has no value"))
    }

    fn value_of_origin(&self, input: InputId) -> &Value<'a> {
        self.value(self.origin(input))
    }

    ////////////////////////////////////////////////////////////////////////////

    /// Binds read-only caller data to an output socket of a dummy node
    pub fn add_single_input_from_caller(
        &mut self,
        socket: OutputId,
        data: VArray<'a>,
    ) {
        debug_assert_eq!(
            self.data_type(socket),
            DataType::Single(data.element_type())
        );
        self.bind(socket, Value::InputSingle(data));
    }

    /// Binds read-only caller vector data to an output socket of a dummy node
    pub fn add_vector_input_from_caller(
        &mut self,
        socket: OutputId,
        data: VVectorArray<'a>,
    ) {
        debug_assert_eq!(
            self.data_type(socket),
            DataType::Vector(data.element_type())
        );
        self.bind(socket, Value::InputVector(data));
    }

    /// Binds a caller buffer, which will be filled by the socket's node
    pub fn add_single_output_from_caller(
        &mut self,
        socket: OutputId,
        column: &'a mut Column,
    ) {
        assert!(column.len() >= self.mask.min_array_size());
        self.bind(
            socket,
            Value::OutputSingle {
                column,
                is_computed: false,
            },
        );
    }

    /// Binds a caller vector buffer, which will be filled by the socket's node
    pub fn add_vector_output_from_caller(
        &mut self,
        socket: OutputId,
        column: &'a mut VectorColumn,
    ) {
        assert!(column.len() >= self.mask.min_array_size());
        self.bind(
            socket,
            Value::OutputVector {
                column,
                is_computed: false,
            },
        );
    }

    ////////////////////////////////////////////////////////////////////////////

    /// Returns a per-index view of the value read by an input socket
    pub fn get_single_input_full(&self, input: InputId) -> VArray<'_> {
        match self.value_of_origin(input) {
            Value::InputSingle(v) => *v,
            Value::OutputSingle { column, is_computed } => {
                debug_assert!(*is_computed);
                VArray::Span(&**column)
            }
            Value::OwnSingle {
                column,
                is_single_allocation,
                ..
            } => {
                if *is_single_allocation {
                    VArray::single(column)
                } else {
                    VArray::Span(column)
                }
            }
            v => panic!("{input} cannot read {} as a single value", v.kind()),
        }
    }

    /// Returns a single-value view of the value read by an input socket
    pub fn get_single_input_single(&self, input: InputId) -> VArray<'_> {
        match self.value_of_origin(input) {
            Value::InputSingle(v) => v.collapse(self.first_index()),
            Value::OwnSingle {
                column,
                is_single_allocation,
                ..
            } => {
                assert!(*is_single_allocation);
                VArray::single(column)
            }
            v => panic!("{input} cannot read {} as one value", v.kind()),
        }
    }

    /// Returns a per-index view of the vector read by an input socket
    pub fn get_vector_input_full(&self, input: InputId) -> VVectorArray<'_> {
        match self.value_of_origin(input) {
            Value::InputVector(v) => *v,
            Value::OutputVector { column, is_computed } => {
                debug_assert!(*is_computed);
                VVectorArray::Span(&**column)
            }
            Value::OwnVector {
                column,
                is_single_allocation,
                ..
            } => {
                if *is_single_allocation {
                    VVectorArray::single(column)
                } else {
                    VVectorArray::Span(column)
                }
            }
            v => panic!("{input} cannot read {} as a vector", v.kind()),
        }
    }

    /// Returns a single-vector view of the vector read by an input socket
    pub fn get_vector_input_single(
        &self,
        input: InputId,
    ) -> VVectorArray<'_> {
        match self.value_of_origin(input) {
            Value::InputVector(v) => v.collapse(self.first_index()),
            Value::OwnVector {
                column,
                is_single_allocation,
                ..
            } => {
                assert!(*is_single_allocation);
                VVectorArray::single(column)
            }
            v => panic!("{input} cannot read {} as one vector", v.kind()),
        }
    }

    fn first_index(&self) -> usize {
        self.mask.first().unwrap_or(0)
    }

    ////////////////////////////////////////////////////////////////////////////

    /// Prepares a per-index buffer for an output socket
    ///
    /// If the caller bound a buffer to this socket, that buffer is used;
    /// otherwise, a buffer sized to the mask is owned by the storage.
    pub fn get_single_output_full(
        &mut self,
        socket: OutputId,
    ) -> OutputSlot<'a> {
        let value = match self.values[socket].take() {
            Some(v @ Value::OutputSingle { .. }) => v,
            None => {
                let t = self.data_type(socket).element_type();
                let n = self.mask.min_array_size();
                Value::OwnSingle {
                    column: self.pool.obtain_column(t, n),
                    max_remaining_users: self.users(socket),
                    is_single_allocation: false,
                }
            }
            Some(v) => panic!("{socket} is already bound to {}", v.kind()),
        };
        OutputSlot {
            socket,
            value,
            broadcast_to: None,
        }
    }

    /// Prepares a one-value buffer for an output socket
    ///
    /// If the caller bound a buffer to this socket, the one value is broadcast
    /// into that buffer when the slot is restored.
    pub fn get_single_output_single(
        &mut self,
        socket: OutputId,
    ) -> OutputSlot<'a> {
        let broadcast_to = self.take_caller_output(socket);
        let t = self.data_type(socket).element_type();
        let value = Value::OwnSingle {
            column: self.pool.obtain_column(t, 1),
            max_remaining_users: self.users(socket),
            is_single_allocation: true,
        };
        OutputSlot {
            socket,
            value,
            broadcast_to,
        }
    }

    /// Prepares a per-index vector buffer for an output socket
    pub fn get_vector_output_full(
        &mut self,
        socket: OutputId,
    ) -> OutputSlot<'a> {
        let value = match self.values[socket].take() {
            Some(v @ Value::OutputVector { .. }) => v,
            None => {
                let t = self.data_type(socket).element_type();
                let n = self.mask.min_array_size();
                Value::OwnVector {
                    column: self.pool.obtain_vector(t, n),
                    max_remaining_users: self.users(socket),
                    is_single_allocation: false,
                }
            }
            Some(v) => panic!("{socket} is already bound to {}", v.kind()),
        };
        OutputSlot {
            socket,
            value,
            broadcast_to: None,
        }
    }

    /// Prepares a one-vector buffer for an output socket
    pub fn get_vector_output_single(
        &mut self,
        socket: OutputId,
    ) -> OutputSlot<'a> {
        let broadcast_to = self.take_caller_output(socket);
        let t = self.data_type(socket).element_type();
        let value = Value::OwnVector {
            column: self.pool.obtain_vector(t, 1),
            max_remaining_users: self.users(socket),
            is_single_allocation: true,
        };
        OutputSlot {
            socket,
            value,
            broadcast_to,
        }
    }

    /// Takes the caller's buffer (if any) out of an unbound output socket
    fn take_caller_output(&mut self, socket: OutputId) -> Option<Value<'a>> {
        match self.values[socket].take() {
            None => None,
            Some(
                v @ (Value::OutputSingle { .. } | Value::OutputVector { .. }),
            ) => Some(v),
            Some(v) => panic!("{socket} is already bound to {}", v.kind()),
        }
    }

    /// Prepares a per-index buffer for a mutable parameter, initialized with
    /// the value read by `input`
    ///
    /// If the caller bound a buffer to `output`, the input is copied into it.
    /// Otherwise, if this is the last reader of an owned per-index buffer, that
    /// buffer is moved to `output` without copying; failing that, the input is
    /// copied into a new buffer.
    pub fn get_mutable_single_full(
        &mut self,
        input: InputId,
        output: OutputId,
    ) -> OutputSlot<'a> {
        let mask = self.mask;
        let users = self.users(output);
        let from = self.origin(input);
        let value = match self.values[output].take() {
            Some(Value::OutputSingle {
                column,
                is_computed,
            }) => {
                column.materialize(mask, self.get_single_input_full(input));
                Value::OutputSingle {
                    column,
                    is_computed,
                }
            }
            None => match self.values[from].take() {
                Some(Value::OwnSingle {
                    column,
                    max_remaining_users: 1,
                    is_single_allocation: false,
                }) => {
                    trace!("moving buffer from {from} to {output}");
                    Value::OwnSingle {
                        column,
                        max_remaining_users: users,
                        is_single_allocation: false,
                    }
                }
                v => {
                    self.values[from] = v;
                    let t = self.data_type(output).element_type();
                    let mut column =
                        self.pool.obtain_column(t, mask.min_array_size());
                    column.materialize(mask, self.get_single_input_full(input));
                    Value::OwnSingle {
                        column,
                        max_remaining_users: users,
                        is_single_allocation: false,
                    }
                }
            },
            Some(v) => panic!("{output} is already bound to {}", v.kind()),
        };
        OutputSlot {
            socket: output,
            value,
            broadcast_to: None,
        }
    }

    /// Prepares a one-value buffer for a mutable parameter, initialized with
    /// the single value read by `input`
    pub fn get_mutable_single_single(
        &mut self,
        input: InputId,
        output: OutputId,
    ) -> OutputSlot<'a> {
        let broadcast_to = self.take_caller_output(output);
        let users = self.users(output);
        let from = self.origin(input);
        let value = match self.values[from].take() {
            Some(Value::OwnSingle {
                column,
                max_remaining_users: 1,
                is_single_allocation: true,
            }) => Value::OwnSingle {
                column,
                max_remaining_users: users,
                is_single_allocation: true,
            },
            v => {
                self.values[from] = v;
                let t = self.data_type(output).element_type();
                let mut column = self.pool.obtain_column(t, 1);
                column.materialize(
                    &IndexMask::new(1),
                    self.get_single_input_single(input),
                );
                Value::OwnSingle {
                    column,
                    max_remaining_users: users,
                    is_single_allocation: true,
                }
            }
        };
        OutputSlot {
            socket: output,
            value,
            broadcast_to,
        }
    }

    /// Prepares a per-index vector buffer for a mutable parameter, initialized
    /// with the vector read by `input`
    ///
    /// This follows the same rules as
    /// [`get_mutable_single_full`](Self::get_mutable_single_full).
    pub fn get_mutable_vector_full(
        &mut self,
        input: InputId,
        output: OutputId,
    ) -> OutputSlot<'a> {
        let mask = self.mask;
        let users = self.users(output);
        let from = self.origin(input);
        let value = match self.values[output].take() {
            Some(Value::OutputVector {
                column,
                is_computed,
            }) => {
                column.extend(mask, self.get_vector_input_full(input));
                Value::OutputVector {
                    column,
                    is_computed,
                }
            }
            None => match self.values[from].take() {
                Some(Value::OwnVector {
                    column,
                    max_remaining_users: 1,
                    is_single_allocation: false,
                }) => {
                    trace!("moving buffer from {from} to {output}");
                    Value::OwnVector {
                        column,
                        max_remaining_users: users,
                        is_single_allocation: false,
                    }
                }
                v => {
                    self.values[from] = v;
                    let t = self.data_type(output).element_type();
                    let mut column =
                        self.pool.obtain_vector(t, mask.min_array_size());
                    column.extend(mask, self.get_vector_input_full(input));
                    Value::OwnVector {
                        column,
                        max_remaining_users: users,
                        is_single_allocation: false,
                    }
                }
            },
            Some(v) => panic!("{output} is already bound to {}", v.kind()),
        };
        OutputSlot {
            socket: output,
            value,
            broadcast_to: None,
        }
    }

    /// Prepares a one-vector buffer for a mutable parameter, initialized with
    /// the single vector read by `input`
    pub fn get_mutable_vector_single(
        &mut self,
        input: InputId,
        output: OutputId,
    ) -> OutputSlot<'a> {
        let broadcast_to = self.take_caller_output(output);
        let users = self.users(output);
        let from = self.origin(input);
        let value = match self.values[from].take() {
            Some(Value::OwnVector {
                column,
                max_remaining_users: 1,
                is_single_allocation: true,
            }) => Value::OwnVector {
                column,
                max_remaining_users: users,
                is_single_allocation: true,
            },
            v => {
                self.values[from] = v;
                let t = self.data_type(output).element_type();
                let mut column = self.pool.obtain_vector(t, 1);
                column.extend(
                    &IndexMask::new(1),
                    self.get_vector_input_single(input),
                );
                Value::OwnVector {
                    column,
                    max_remaining_users: users,
                    is_single_allocation: true,
                }
            }
        };
        OutputSlot {
            socket: output,
            value,
            broadcast_to,
        }
    }

    /// Puts a buffer back into storage after its node has been called
    pub fn restore(&mut self, slot: OutputSlot<'a>) {
        let OutputSlot {
            socket,
            value,
            broadcast_to,
        } = slot;
        let value = match (broadcast_to, value) {
            (None, v) => v,
            (
                Some(Value::OutputSingle {
                    column: dst,
                    is_computed,
                }),
                Value::OwnSingle { column, .. },
            ) => {
                dst.materialize(self.mask, VArray::single(&column));
                self.pool.release_column(column);
                Value::OutputSingle {
                    column: dst,
                    is_computed,
                }
            }
            (
                Some(Value::OutputVector {
                    column: dst,
                    is_computed,
                }),
                Value::OwnVector { column, .. },
            ) => {
                dst.extend(self.mask, VVectorArray::single(&column));
                self.pool.release_vector(column);
                Value::OutputVector {
                    column: dst,
                    is_computed,
                }
            }
            (Some(dst), v) => {
                panic!("cannot broadcast {} into {}", v.kind(), dst.kind())
            }
        };
        self.bind(socket, value);
    }

    ////////////////////////////////////////////////////////////////////////////

    /// Finishes every socket of a node which has just been called
    pub fn finish_node(&mut self, node: super::NodeId) {
        let n = self.network.node(node);
        for &i in n.inputs() {
            self.finish_input_socket(i);
        }
        for &o in n.outputs() {
            self.finish_output_socket(o);
        }
    }

    /// Records that an input socket will not read its origin again
    ///
    /// When the last reader of an owned buffer finishes, the buffer is
    /// released.
    pub fn finish_input_socket(&mut self, input: InputId) {
        let from = self.origin(input);
        let is_done = match &mut self.values[from] {
            // The value was moved to a mutable output
            None => false,
            Some(
                Value::OwnSingle {
                    max_remaining_users,
                    ..
                }
                | Value::OwnVector {
                    max_remaining_users,
                    ..
                },
            ) => {
                assert!(*max_remaining_users >= 1, "{from} has no users left");
                *max_remaining_users -= 1;
                *max_remaining_users == 0
            }
            Some(..) => false,
        };
        if is_done {
            self.release(from);
        }
    }

    /// Records that an output socket has been computed
    ///
    /// Owned buffers which nothing reads are released immediately.
    pub fn finish_output_socket(&mut self, output: OutputId) {
        let is_unused = match &mut self.values[output] {
            Some(
                Value::OutputSingle { is_computed, .. }
                | Value::OutputVector { is_computed, .. },
            ) => {
                *is_computed = true;
                false
            }
            Some(
                Value::OwnSingle {
                    max_remaining_users,
                    ..
                }
                | Value::OwnVector {
                    max_remaining_users,
                    ..
                },
            ) => *max_remaining_users == 0,
            Some(..) => false,
            None => panic!("{output} was not computed"),
        };
        if is_unused {
            self.release(output);
        }
    }

    fn release(&mut self, socket: OutputId) {
        match self.values[socket].take() {
            Some(Value::OwnSingle { column, .. }) => {
                self.pool.release_column(column)
            }
            Some(Value::OwnVector { column, .. }) => {
                self.pool.release_vector(column)
            }
            v => self.values[socket] = v,
        }
    }

    ////////////////////////////////////////////////////////////////////////////

    /// Checks whether the value of an output socket is available
    pub fn socket_is_computed(&self, socket: OutputId) -> bool {
        match &self.values[socket] {
            None => false,
            Some(
                Value::OutputSingle { is_computed, .. }
                | Value::OutputVector { is_computed, .. },
            ) => *is_computed,
            Some(..) => true,
        }
    }

    /// Checks whether the value of an output socket is the same at every
    /// index
    ///
    /// # Panics
    /// If the socket has no value
    pub fn is_same_value_for_every_index(&self, socket: OutputId) -> bool {
        match self.value(socket) {
            Value::InputSingle(v) => v.is_single(),
            Value::InputVector(v) => v.is_single_vector(),
            Value::OutputSingle { .. } | Value::OutputVector { .. } => false,
            Value::OwnSingle {
                is_single_allocation,
                ..
            }
            | Value::OwnVector {
                is_single_allocation,
                ..
            } => *is_single_allocation,
        }
    }

    /// Checks whether an output socket is already bound to a value or buffer
    pub fn socket_has_buffer_for_output(&self, socket: OutputId) -> bool {
        self.values[socket].is_some()
    }
}
