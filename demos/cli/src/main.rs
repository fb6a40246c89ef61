use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use env_logger::Env;
use log::{debug, info};

use multifn::{
    Context, IndexMask, MultiFunction, Network, NetworkEvaluator, Params,
    Procedure, ProcedureExecutor,
    function::{Constant, Interface, Mutate, Si2So, SiSo},
    types::{Column, DataType, ElementType, VArray},
};

/// Evaluates sample networks and procedures over an index mask
#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
struct Args {
    #[clap(subcommand)]
    cmd: Command,

    #[clap(flatten)]
    settings: EvalSettings,
}

#[derive(Subcommand)]
enum Command {
    /// Evaluates `x * x + 3 * x + 1` as a network
    Network,

    /// Counts Collatz steps for each input with a looping procedure
    Procedure {
        /// Print the procedure's instructions before running it
        #[clap(long)]
        print: bool,
    },
}

#[derive(Parser)]
struct EvalSettings {
    /// Number of indices in the buffers
    #[clap(short, long, default_value_t = 1024)]
    size: usize,

    /// Only evaluate every n-th index
    #[clap(long, default_value_t = 1)]
    stride: usize,

    /// Input value at index 0; index `i` gets `start + i`
    #[clap(long, default_value_t = 1)]
    start: i32,

    /// Pass a single input value shared by every index
    #[clap(long)]
    single: bool,

    /// Number of times to evaluate (for benchmarking)
    #[clap(short = 'N', default_value_t = 1)]
    n: usize,

    /// Name of a file to which the output column is written with `bincode`
    #[clap(short, long)]
    out: Option<PathBuf>,
}

const INT: DataType = DataType::Single(ElementType::Int);
const BOOL: DataType = DataType::Single(ElementType::Bool);

////////////////////////////////////////////////////////////////////////////////

fn build_network() -> Result<NetworkEvaluator> {
    let mut net = Network::new();
    let x = net.add_input("x", INT);
    let square = SiSo::new("square", |a: i32| a.wrapping_mul(a));
    let square = net.add_function(Arc::new(square));
    let triple = SiSo::new("triple", |a: i32| a.wrapping_mul(3));
    let triple = net.add_function(Arc::new(triple));
    let add = Si2So::new("add", |a: i32, b: i32| a.wrapping_add(b));
    let add = net.add_function(Arc::new(add));
    let inc = SiSo::new("inc", |a: i32| a.wrapping_add(1));
    let inc = net.add_function(Arc::new(inc));
    let y = net.add_output("y", INT);

    net.add_link(x, net.node(square).input(0))?;
    net.add_link(x, net.node(triple).input(0))?;
    net.add_link(net.node(square).output(0), net.node(add).input(0))?;
    net.add_link(net.node(triple).output(0), net.node(add).input(1))?;
    net.add_link(net.node(add).output(0), net.node(inc).input(0))?;
    net.add_link(net.node(inc).output(0), y)?;
    Ok(NetworkEvaluator::new(Arc::new(net), vec![x], vec![y])?)
}

fn build_procedure() -> Result<Procedure> {
    let mut p = Procedure::new();
    let x = p.new_variable(INT, "x");
    let steps = p.new_variable(INT, "steps");
    let v = p.new_variable(INT, "v");
    let not_done = p.new_variable(BOOL, "not_done");
    let even = p.new_variable(BOOL, "even");
    p.add_parameter(Interface::Input, x);
    p.add_parameter(Interface::Output, steps);

    let copy = SiSo::new("copy", |a: i32| a);
    let copy = p.new_call(Arc::new(copy), vec![Some(x), Some(v)]);
    let zero = p.new_call(Arc::new(Constant::new(0i32)), vec![Some(steps)]);
    let check = SiSo::new("not_one", |a: i32| a > 1);
    let check = p.new_call(Arc::new(check), vec![Some(v), Some(not_done)]);
    let looping = p.new_branch(not_done);

    let body = p.new_destruct(not_done);
    let parity = SiSo::new("is_even", |a: i32| a % 2 == 0);
    let parity = p.new_call(Arc::new(parity), vec![Some(v), Some(even)]);
    let split = p.new_branch(even);
    let d_even = p.new_destruct(even);
    let halve = Mutate::new("halve", |a: &mut i32| *a /= 2);
    let halve = p.new_call(Arc::new(halve), vec![Some(v)]);
    let d_odd = p.new_destruct(even);
    let grow = Mutate::new("grow", |a: &mut i32| {
        *a = a.wrapping_mul(3).wrapping_add(1)
    });
    let grow = p.new_call(Arc::new(grow), vec![Some(v)]);
    let count = Mutate::new("count", |a: &mut i32| *a += 1);
    let count = p.new_call(Arc::new(count), vec![Some(steps)]);

    let exit = p.new_destruct(not_done);
    let dv = p.new_destruct(v);
    let dx = p.new_destruct(x);
    let ret = p.new_return();

    p.set_entry(copy);
    p.set_next(copy, zero)?;
    p.set_next(zero, check)?;
    p.set_next(check, looping)?;
    p.set_branch_true(looping, body)?;
    p.set_branch_false(looping, exit)?;
    p.set_next(body, parity)?;
    p.set_next(parity, split)?;
    p.set_branch_true(split, d_even)?;
    p.set_branch_false(split, d_odd)?;
    p.set_next(d_even, halve)?;
    p.set_next(halve, count)?;
    p.set_next(d_odd, grow)?;
    p.set_next(grow, count)?;
    p.set_next(count, check)?;
    p.set_next(exit, dv)?;
    p.set_next(dv, dx)?;
    p.set_next(dx, ret)?;
    Ok(p)
}

/// Runs `f` with a single integer input and a single integer output
fn run(f: &dyn MultiFunction, settings: &EvalSettings) -> Result<Column> {
    if settings.stride == 0 {
        bail!("stride must be at least 1");
    }
    let data = if settings.single {
        Column::from(vec![settings.start])
    } else {
        let n = i32::try_from(settings.size)?;
        Column::from((0..n).map(|i| settings.start + i).collect::<Vec<_>>())
    };
    let mask = if settings.stride == 1 {
        IndexMask::new(settings.size)
    } else {
        let indices = (0..settings.size).step_by(settings.stride).collect();
        IndexMask::from_indices(indices)
    };
    debug!("evaluating {} of {} indices", mask.len(), settings.size);

    let ctx = Context::new();
    let mut out = Column::new(ElementType::Int, settings.size);
    for _ in 0..settings.n {
        let mut params = Params::new();
        params.add_readonly_single_input(if settings.single {
            VArray::single(&data)
        } else {
            VArray::Span(&data)
        });
        params.add_uninitialized_single_output(&mut out);
        f.call(&mask, &mut params, &ctx);
    }
    Ok(out)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .init();
    let args = Args::parse();

    let start = Instant::now();
    let f: Arc<dyn MultiFunction> = match args.cmd {
        Command::Network => Arc::new(build_network()?),
        Command::Procedure { print } => {
            let p = build_procedure()?;
            if print {
                println!("{p}");
            }
            Arc::new(ProcedureExecutor::new(Arc::new(p))?)
        }
    };
    info!("Built {} in {:?}", f.signature().name(), start.elapsed());

    let start = Instant::now();
    let out = run(&*f, &args.settings)?;
    info!(
        "Evaluated {}x at {:?} ms/call",
        args.settings.n,
        start.elapsed().as_micros() as f64
            / 1000.0
            / (args.settings.n.max(1) as f64)
    );

    let values = out.as_slice::<i32>();
    let shown = values.len().min(8);
    info!("First outputs: {:?}", &values[..shown]);
    if let Some(path) = args.settings.out {
        let file = std::fs::File::create(&path)?;
        bincode::serialize_into(std::io::BufWriter::new(file), &out)?;
        info!("Wrote {} values to {path:?}", values.len());
    }
    Ok(())
}
