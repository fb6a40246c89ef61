//! `multifn` is an evaluation engine for vectorized multi-functions.
//!
//! A **multi-function** is a function which is evaluated over many indices at
//! once.  It has a fixed [signature](function::Signature): an ordered list of
//! typed parameters, each of which is an input, an output, or a mutable
//! (read-write) parameter.  Each call receives an [`IndexMask`] selecting the
//! indices to evaluate, and must only touch those indices in its outputs.
//!
//! Functions are composed in two ways:
//!
//! - A [`Network`] is a directed acyclic graph of function nodes, whose input
//!   sockets are linked to the output sockets of other nodes.  The
//!   [`NetworkEvaluator`] calls only the nodes needed to compute the requested
//!   outputs, reuses buffers once their last reader is done, and calls a node
//!   just once (for a single index) when every one of its inputs is the same
//!   at every index.
//! - A [`Procedure`] is a list of instructions operating on typed variables,
//!   with branches.  The [`ProcedureExecutor`] splits the mask at each branch
//!   and evaluates each set of indices along its own path.
//!
//! Both evaluators are themselves multi-functions, so networks and procedures
//! can be nested inside each other.
//!
//! # Values
//! Data is stored in runtime-typed [`Column`](types::Column)s (one value per
//! index) and [`VectorColumn`](types::VectorColumn)s (one list per index).
//! Read-only inputs are passed as [`VArray`](types::VArray) views, which may
//! refer to a single value shared by every index.
//!
//! # Example
//! ```
//! use multifn::{
//!     Context, IndexMask, MultiFunction, Network, NetworkEvaluator, Params,
//!     function::{Si2So, SiSo},
//!     types::{Column, DataType, ElementType, VArray},
//! };
//! use std::sync::Arc;
//!
//! const F: DataType = DataType::Single(ElementType::Float);
//!
//! // out = (x + y) * -1
//! let mut net = Network::new();
//! let x = net.add_input("x", F);
//! let y = net.add_input("y", F);
//! let add = Si2So::new("add", |a: f32, b: f32| a + b);
//! let add = net.add_function(Arc::new(add));
//! let neg = net.add_function(Arc::new(SiSo::new("neg", |a: f32| -a)));
//! let out = net.add_output("out", F);
//! net.add_link(x, net.node(add).input(0))?;
//! net.add_link(y, net.node(add).input(1))?;
//! net.add_link(net.node(add).output(0), net.node(neg).input(0))?;
//! net.add_link(net.node(neg).output(0), out)?;
//!
//! let eval = NetworkEvaluator::new(Arc::new(net), vec![x, y], vec![out])?;
//!
//! let xs = Column::from(vec![1.0f32, 2.0, 3.0]);
//! let ys = Column::from(vec![10.0f32]);
//! let mut result = Column::new(ElementType::Float, 3);
//! let mut params = Params::new();
//! params.add_readonly_single_input(VArray::Span(&xs));
//! params.add_readonly_single_input(VArray::single(&ys));
//! params.add_uninitialized_single_output(&mut result);
//! eval.call(&IndexMask::new(3), &mut params, &Context::new());
//! drop(params);
//!
//! assert_eq!(result.as_slice::<f32>(), &[-11.0, -12.0, -13.0]);
//! # Ok::<(), multifn::Error>(())
//! ```
#![warn(missing_docs)]

pub mod function;
pub mod index;
pub mod mask;
pub mod network;
pub mod pool;
pub mod procedure;
pub mod types;

mod error;

pub use error::Error;
pub use function::{Context, MultiFunction, Params};
pub use mask::IndexMask;
pub use network::{Network, NetworkEvaluator};
pub use pool::BufferPool;
pub use procedure::{Procedure, ProcedureExecutor};

// Evaluators are shared between threads as `Arc<dyn MultiFunction>`
static_assertions::assert_impl_all!(NetworkEvaluator: Send, Sync);
static_assertions::assert_impl_all!(ProcedureExecutor: Send, Sync);
static_assertions::assert_impl_all!(Network: Send, Sync, Clone);
static_assertions::assert_impl_all!(Procedure: Send, Sync, Clone);
