//! Integration tests for procedure execution
use multifn::{
    Context, IndexMask, MultiFunction, Network, NetworkEvaluator, Params,
    Procedure, ProcedureExecutor,
    function::{
        Constant, Counted, Interface, Mutate, Si2So, SiSo, VectorConstant,
        VectorSum,
    },
    mask::indices_split,
    types::{Column, DataType, ElementType, VArray, VectorColumn},
};
use rand::{Rng, SeedableRng, rngs::StdRng};
use std::sync::Arc;

const INT: DataType = DataType::Single(ElementType::Int);
const BOOL: DataType = DataType::Single(ElementType::Bool);

struct Select {
    exec: ProcedureExecutor,
    on_true: Arc<Counted<Constant<i32>>>,
    on_false: Arc<Counted<Constant<i32>>>,
}

/// `out = cond ? 1 : 2`, with each side ending in its own `Return`
fn select() -> Select {
    let on_true = Arc::new(Counted::new(Constant::new(1)));
    let on_false = Arc::new(Counted::new(Constant::new(2)));

    let mut p = Procedure::new();
    let cond = p.new_variable(BOOL, "cond");
    let out = p.new_variable(INT, "out");
    p.add_parameter(Interface::Input, cond);
    p.add_parameter(Interface::Output, out);
    let branch = p.new_branch(cond);
    p.set_entry(branch);
    for (f, is_true) in [(on_true.clone(), true), (on_false.clone(), false)] {
        let d = p.new_destruct(cond);
        let c = p.new_call(f, vec![Some(out)]);
        let r = p.new_return();
        p.set_next(d, c).unwrap();
        p.set_next(c, r).unwrap();
        if is_true {
            p.set_branch_true(branch, d).unwrap();
        } else {
            p.set_branch_false(branch, d).unwrap();
        }
    }
    Select {
        exec: ProcedureExecutor::new(Arc::new(p)).unwrap(),
        on_true,
        on_false,
    }
}

fn run_select(
    s: &Select,
    mask: &IndexMask,
    cond: &Column,
    len: usize,
) -> Vec<i32> {
    let mut out = Column::from(vec![-1i32; len]);
    let mut params = Params::new();
    params.add_readonly_single_input(VArray::Span(cond));
    params.add_uninitialized_single_output(&mut out);
    s.exec.call(mask, &mut params, &Context::new());
    drop(params);
    out.as_slice::<i32>().to_vec()
}

#[test]
fn scenario_c() {
    let s = select();
    let cond = Column::from(vec![true, false, true, false, true]);
    let out = run_select(&s, &IndexMask::new(5), &cond, 5);

    assert_eq!(out, [1, 2, 1, 2, 1]);
    assert_eq!((s.on_true.calls(), s.on_true.indices()), (1, 3));
    assert_eq!((s.on_false.calls(), s.on_false.indices()), (1, 2));
}

#[test]
fn partition_completeness() {
    let mut rng = StdRng::seed_from_u64(1234);
    let n = 200;
    for _ in 0..10 {
        let cond = (0..n).map(|_| rng.gen_bool(0.5)).collect::<Vec<_>>();
        let indices =
            (0..n).filter(|_| rng.gen_bool(0.6)).collect::<Vec<_>>();
        let mask = IndexMask::from_indices(indices);

        let [f, t] = indices_split(&mask, |i| cond[i]);
        assert!(t.iter().all(|&i| cond[i]) && f.iter().all(|&i| !cond[i]));
        let mut joined = [f.clone(), t.clone()].concat();
        joined.sort_unstable();
        assert_eq!(joined, mask.to_vec());

        // Every index lands on exactly one side of the branch, and nothing
        // outside the mask is written
        let s = select();
        let out = run_select(&s, &mask, &Column::from(cond.clone()), n);
        for (i, v) in out.iter().enumerate() {
            let expected = match (mask.contains(i), cond[i]) {
                (false, _) => -1,
                (true, true) => 1,
                (true, false) => 2,
            };
            assert_eq!(*v, expected);
        }
        assert_eq!(s.on_true.indices(), t.len());
        assert_eq!(s.on_false.indices(), f.len());
    }
}

/// `out = 0; while out < n { out += 1 }`
fn counting_loop(inc: Arc<dyn MultiFunction>) -> ProcedureExecutor {
    let mut p = Procedure::new();
    let n = p.new_variable(INT, "n");
    let out = p.new_variable(INT, "out");
    let cond = p.new_variable(BOOL, "cond");
    p.add_parameter(Interface::Input, n);
    p.add_parameter(Interface::Output, out);

    let zero = p.new_call(Arc::new(Constant::new(0)), vec![Some(out)]);
    let lt = p.new_call(
        Arc::new(Si2So::new("lt", |a: i32, b: i32| a < b)),
        vec![Some(out), Some(n), Some(cond)],
    );
    let branch = p.new_branch(cond);
    let body = p.new_destruct(cond);
    let step = p.new_call(inc, vec![Some(out)]);
    let exit = p.new_destruct(cond);
    let dn = p.new_destruct(n);
    let r = p.new_return();

    p.set_entry(zero);
    p.set_next(zero, lt).unwrap();
    p.set_next(lt, branch).unwrap();
    p.set_branch_true(branch, body).unwrap();
    p.set_branch_false(branch, exit).unwrap();
    p.set_next(body, step).unwrap();
    p.set_next(step, lt).unwrap();
    p.set_next(exit, dn).unwrap();
    p.set_next(dn, r).unwrap();
    ProcedureExecutor::new(Arc::new(p)).unwrap()
}

#[test]
fn loops_reconverge() {
    let inc = Arc::new(Counted::new(Mutate::new("inc", |v: &mut i32| {
        *v += 1
    })));
    let exec = counting_loop(inc.clone());

    let n = Column::from(vec![0i32, 3, 1, 5]);
    let mut out = Column::new(ElementType::Int, 4);
    let mut params = Params::new();
    params.add_readonly_single_input(VArray::Span(&n));
    params.add_uninitialized_single_output(&mut out);
    exec.call(&IndexMask::new(4), &mut params, &Context::new());
    drop(params);

    assert_eq!(out.as_slice::<i32>(), &[0, 3, 1, 5]);
    assert_eq!(inc.calls(), 5);
    assert_eq!(inc.indices(), 3 + 1 + 5);
}

#[test]
fn loop_with_single_bound() {
    let inc = Arc::new(Counted::new(Mutate::new("inc", |v: &mut i32| {
        *v += 1
    })));
    let exec = counting_loop(inc.clone());

    // Every index runs the same iterations, on a single value
    let n = Column::from(vec![3i32]);
    let mut out = Column::new(ElementType::Int, 6);
    let mut params = Params::new();
    params.add_readonly_single_input(VArray::single(&n));
    params.add_ignored_single_output(ElementType::Int, 6);
    exec.call(&IndexMask::new(6), &mut params, &Context::new());
    drop(params);
    assert_eq!((inc.calls(), inc.indices()), (3, 3));

    inc.reset();
    let mut params = Params::new();
    params.add_readonly_single_input(VArray::single(&n));
    params.add_uninitialized_single_output(&mut out);
    exec.call(&IndexMask::range(2..6), &mut params, &Context::new());
    drop(params);
    assert_eq!(out.as_slice::<i32>(), &[0, 0, 3, 3, 3, 3]);
    assert_eq!((inc.calls(), inc.indices()), (3, 3));
}

#[test]
fn network_inside_procedure_inside_network() {
    // Inner network: y = x * 3
    let mut net = Network::new();
    let x = net.add_input("x", INT);
    let n = net.add_function(Arc::new(SiSo::new("triple", |a: i32| a * 3)));
    let y = net.add_output("y", INT);
    net.add_link(x, net.node(n).input(0)).unwrap();
    net.add_link(net.node(n).output(0), y).unwrap();
    let triple = Arc::new(
        NetworkEvaluator::new(Arc::new(net), vec![x], vec![y]).unwrap(),
    );

    // Procedure: out = flag ? triple(v) : v
    let mut p = Procedure::new();
    let flag = p.new_variable(BOOL, "flag");
    let v = p.new_variable(INT, "v");
    let out = p.new_variable(INT, "out");
    p.add_parameter(Interface::Input, flag);
    p.add_parameter(Interface::Input, v);
    p.add_parameter(Interface::Output, out);
    let branch = p.new_branch(flag);
    let call = p.new_call(triple, vec![Some(v), Some(out)]);
    let copy = p.new_call(
        Arc::new(SiSo::new("copy", |a: i32| a)),
        vec![Some(v), Some(out)],
    );
    let join = p.new_dummy();
    let d1 = p.new_destruct(flag);
    let d2 = p.new_destruct(v);
    let r = p.new_return();
    p.set_entry(branch);
    p.set_branch_true(branch, call).unwrap();
    p.set_branch_false(branch, copy).unwrap();
    p.set_next(call, join).unwrap();
    p.set_next(copy, join).unwrap();
    p.set_next(join, d1).unwrap();
    p.set_next(d1, d2).unwrap();
    p.set_next(d2, r).unwrap();
    let proc = Arc::new(ProcedureExecutor::new(Arc::new(p)).unwrap());

    // Outer network feeds the procedure from `a > 0`
    let mut net = Network::new();
    let a = net.add_input("a", INT);
    let gt = net.add_function(Arc::new(SiSo::new("pos", |a: i32| a > 0)));
    let pn = net.add_function(proc);
    let o = net.add_output("o", INT);
    net.add_link(a, net.node(gt).input(0)).unwrap();
    net.add_link(net.node(gt).output(0), net.node(pn).input(0)).unwrap();
    net.add_link(a, net.node(pn).input(1)).unwrap();
    net.add_link(net.node(pn).output(0), o).unwrap();
    let eval = NetworkEvaluator::new(Arc::new(net), vec![a], vec![o]).unwrap();

    let data = Column::from(vec![2i32, -1, 0, 5]);
    let mut result = Column::new(ElementType::Int, 4);
    let mut params = Params::new();
    params.add_readonly_single_input(VArray::Span(&data));
    params.add_uninitialized_single_output(&mut result);
    eval.call(&IndexMask::new(4), &mut params, &Context::new());
    drop(params);

    assert_eq!(result.as_slice::<i32>(), &[6, -1, 0, 15]);
}

const INTS: DataType = DataType::Vector(ElementType::Int);

/// `v = [1]; if cond { v = [2] }`, with `v` either returned directly or
/// summed into a single output
fn rewrite_in_branch(local: bool) -> ProcedureExecutor {
    let mut p = Procedure::new();
    let cond = p.new_variable(BOOL, "cond");
    let v = p.new_variable(INTS, "v");
    p.add_parameter(Interface::Input, cond);
    let sum = if local {
        let sum = p.new_variable(INT, "sum");
        p.add_parameter(Interface::Output, sum);
        Some(sum)
    } else {
        p.add_parameter(Interface::Output, v);
        None
    };

    let one = Arc::new(VectorConstant::new(vec![1i32]));
    let two = Arc::new(VectorConstant::new(vec![2i32]));
    let init = p.new_call(one, vec![Some(v)]);
    let branch = p.new_branch(cond);
    let dv = p.new_destruct(v);
    let rewrite = p.new_call(two, vec![Some(v)]);
    let join = p.new_dummy();
    let dc = p.new_destruct(cond);
    let r = p.new_return();
    p.set_entry(init);
    p.set_next(init, branch).unwrap();
    p.set_branch_true(branch, dv).unwrap();
    p.set_branch_false(branch, join).unwrap();
    p.set_next(dv, rewrite).unwrap();
    p.set_next(rewrite, join).unwrap();
    match sum {
        Some(sum) => {
            let f = Arc::new(VectorSum::<i32>::new());
            let call = p.new_call(f, vec![Some(v), Some(sum)]);
            let dv_end = p.new_destruct(v);
            p.set_next(join, call).unwrap();
            p.set_next(call, dv_end).unwrap();
            p.set_next(dv_end, dc).unwrap();
        }
        None => p.set_next(join, dc).unwrap(),
    }
    p.set_next(dc, r).unwrap();
    ProcedureExecutor::new(Arc::new(p)).unwrap()
}

#[test]
fn vector_output_rewritten_in_branch() {
    let exec = rewrite_in_branch(false);
    let cond = Column::from(vec![true, false, true, false, true]);
    let mut out = VectorColumn::new(ElementType::Int, 5);
    let mut params = Params::new();
    params.add_readonly_single_input(VArray::Span(&cond));
    params.add_vector_output(&mut out);
    exec.call(&IndexMask::new(5), &mut params, &Context::new());
    drop(params);

    let lists = (0..5).map(|i| out.get::<i32>(i).to_vec()).collect::<Vec<_>>();
    assert_eq!(lists, [vec![2], vec![1], vec![2], vec![1], vec![2]]);
}

#[test]
fn local_vector_rewritten_in_branch() {
    let exec = rewrite_in_branch(true);
    let cond = Column::from(vec![false, true, true, false]);
    let mut out = Column::from(vec![-1i32; 5]);
    let mut params = Params::new();
    params.add_readonly_single_input(VArray::Span(&cond));
    params.add_uninitialized_single_output(&mut out);
    exec.call(&IndexMask::new(4), &mut params, &Context::new());
    drop(params);

    assert_eq!(out.as_slice::<i32>(), &[1, 2, 2, 1, -1]);
}
