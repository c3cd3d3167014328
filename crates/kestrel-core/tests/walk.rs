//! Tests for the stackwalk driver: classification, chain bracketing,
//! funclet collapsing, and delivery order.

use kestrel_core::config::{ArchProfile, WalkConfig};
use kestrel_core::types::{
    Address, AppDomainId, ChainReason, ExitInfo, ExplicitFrame, ExplicitFrameKind, FrameInfo,
    FramePointer, FuncletParentHint, InterceptionKind, MethodId, OsThreadId, RawFrame,
    RegisterSnapshot, StubFrameType, ThreadContext, TransitionKind,
};
use kestrel_core::walk::{
    walk_stack, RawWalkOutcome, StackWalker, WalkControl, WalkOptions, WalkOutcome,
};
use kestrel_utils::init_test_logging;

/// Replays a fixed list of raw frames, leaf to root.
struct ScriptedWalker
{
    frames: Vec<RawFrame>,
    outcome: RawWalkOutcome,
    visited: usize,
}

impl ScriptedWalker
{
    fn new(frames: Vec<RawFrame>) -> Self
    {
        ScriptedWalker {
            frames,
            outcome: RawWalkOutcome::Done,
            visited: 0,
        }
    }

    fn failing(frames: Vec<RawFrame>) -> Self
    {
        ScriptedWalker {
            frames,
            outcome: RawWalkOutcome::Failed,
            visited: 0,
        }
    }
}

impl StackWalker for ScriptedWalker
{
    fn walk_frames(
        &mut self,
        visit: &mut dyn FnMut(&RawFrame) -> WalkControl,
    ) -> RawWalkOutcome
    {
        for index in 0..self.frames.len() {
            self.visited += 1;
            let frame = self.frames[index];
            if visit(&frame) == WalkControl::Abort {
                return RawWalkOutcome::Aborted;
            }
        }
        self.outcome
    }
}

fn walkable_thread() -> ThreadContext
{
    // Stack base sits rootward (numerically above) every test frame.
    ThreadContext::new(OsThreadId::new(42), Address::new(0xf_0000))
}

fn managed(id: u64, sp: u64) -> RawFrame
{
    RawFrame::managed_method(
        MethodId::new(id),
        RegisterSnapshot::at(Address::new(sp)),
        AppDomainId::new(1),
    )
}

fn marker(sp: u64) -> RawFrame
{
    RawFrame::native_marker(RegisterSnapshot::at(Address::new(sp)))
}

fn exit_frame(address: u64, call_site: u64, registers_at: u64) -> RawFrame
{
    let mut frame = ExplicitFrame::new(Address::new(address), ExplicitFrameKind::Exit);
    frame.transition = TransitionKind::ManagedToUnmanaged;
    frame.exit = Some(ExitInfo {
        left_runtime: true,
        call_site_sp: Some(Address::new(call_site)),
    });
    RawFrame::explicit(frame, RegisterSnapshot::at(Address::new(registers_at)))
}

fn collect_walk(
    frames: Vec<RawFrame>,
    options: WalkOptions,
    config: WalkConfig,
) -> (WalkOutcome, Vec<FrameInfo>)
{
    let mut walker = ScriptedWalker::new(frames);
    let thread = walkable_thread();
    let mut records = Vec::new();
    let outcome = walk_stack(
        &mut walker,
        &thread,
        options,
        config,
        ArchProfile::funclets(),
        &mut |frame: &FrameInfo| {
            records.push(frame.clone());
            WalkControl::Continue
        },
    );
    (outcome, records)
}

#[test]
fn test_managed_frame_then_enter_managed_then_thread_start()
{
    init_test_logging();

    let mut leaf = managed(1, 0x1000);
    leaf.active = true;

    let (outcome, records) = collect_walk(
        vec![leaf, marker(0x2000)],
        WalkOptions::default(),
        WalkConfig::default(),
    );

    assert_eq!(outcome, WalkOutcome::Completed);
    assert_eq!(records.len(), 3);

    assert_eq!(records[0].method, Some(MethodId::new(1)));
    assert!(records[0].managed);
    assert!(records[0].is_leaf);
    assert_eq!(records[0].fp, FramePointer::from_address(Address::new(0x1000)));

    assert_eq!(records[1].chain_reason, ChainReason::EnterManaged);
    assert!(records[1].managed);

    assert_eq!(records[2].chain_reason, ChainReason::ThreadStart);
    assert!(!records[2].managed);
    // The open native run at the root folds into the thread-start chain.
    assert_eq!(records[2].fp, FramePointer::from_address(Address::new(0x2000)));

    // Delivery order is leaf to root.
    assert!(records[0].fp.is_closer_to_leaf(records[1].fp));
    assert!(records[1].fp.is_closer_to_leaf(records[2].fp));
}

#[test]
fn test_native_leaf_called_from_managed()
{
    init_test_logging();

    // Leaf native code, reached from managed M1 through an exit frame,
    // with M1 itself called from native thread-start code.
    let frames = vec![
        marker(0x900),
        exit_frame(0x1000, 0x1100, 0x900),
        managed(1, 0x1200),
        marker(0x2000),
    ];

    let (outcome, records) =
        collect_walk(frames, WalkOptions::default(), WalkConfig::default());

    assert_eq!(outcome, WalkOutcome::Completed);
    assert_eq!(records.len(), 4);

    // The leaf chain's root boundary is the managed caller's call site,
    // not the transition frame's own address.
    assert_eq!(records[0].chain_reason, ChainReason::EnterUnmanaged);
    assert_eq!(records[0].fp, FramePointer::from_address(Address::new(0x1100)));
    assert_eq!(records[0].registers.sp, Address::new(0x900));

    assert_eq!(records[1].method, Some(MethodId::new(1)));
    assert_eq!(records[1].fp, FramePointer::from_address(Address::new(0x1200)));
    // Pushed-and-crossed exit frame below means the method is not the leaf.
    assert!(!records[1].is_leaf);

    assert_eq!(records[2].chain_reason, ChainReason::EnterManaged);
    assert_eq!(records[3].chain_reason, ChainReason::ThreadStart);

    for pair in records.windows(2) {
        assert!(pair[0].fp.is_closer_to_leaf(pair[1].fp));
    }
}

#[test]
fn test_internal_frames_add_transition_stub()
{
    init_test_logging();

    let frames = vec![
        marker(0x900),
        exit_frame(0x1000, 0x1100, 0x900),
        managed(1, 0x1200),
        marker(0x2000),
    ];

    let options = WalkOptions {
        provide_internal_frames: true,
        ..WalkOptions::default()
    };
    let (outcome, records) = collect_walk(frames, options, WalkConfig::default());

    assert_eq!(outcome, WalkOutcome::Completed);
    assert_eq!(records.len(), 5);

    // The transition stub rides along right after the chain it explains.
    assert_eq!(records[0].chain_reason, ChainReason::EnterUnmanaged);
    assert_eq!(records[1].stub_type, StubFrameType::ManagedToUnmanaged);
    assert_eq!(records[1].frame_address, Some(Address::new(0x1000)));
    assert_eq!(records[2].method, Some(MethodId::new(1)));
    assert_eq!(records[3].chain_reason, ChainReason::EnterManaged);
    assert_eq!(records[4].chain_reason, ChainReason::ThreadStart);
}

#[test]
fn test_interception_chain_stands_in_for_enter_managed()
{
    init_test_logging();

    // A class-init interception rootward of the managed run already
    // brackets it; the native tail above must not pick up a second
    // enter-managed marker.
    let mut leaf = managed(1, 0x1000);
    leaf.active = true;

    let mut class_init = ExplicitFrame::new(Address::new(0x1800), ExplicitFrameKind::Interception);
    class_init.interception = InterceptionKind::ClassInit;

    let frames = vec![
        leaf,
        RawFrame::explicit(class_init, RegisterSnapshot::at(Address::new(0x1800))),
        marker(0x2000),
        exit_frame(0x2800, 0x2900, 0x2000),
    ];

    let (outcome, records) = collect_walk(frames, WalkOptions::default(), WalkConfig::default());

    assert_eq!(outcome, WalkOutcome::Completed);
    let reasons: Vec<ChainReason> = records.iter().map(|r| r.chain_reason).collect();
    assert_eq!(
        reasons,
        vec![
            ChainReason::None,
            ChainReason::ClassInit,
            ChainReason::EnterUnmanaged,
            ChainReason::ThreadStart,
        ]
    );
    assert!(records[1].internal);
    assert_eq!(records[2].fp, FramePointer::from_address(Address::new(0x2900)));
}

#[test]
fn test_unanchored_chain_is_suppressed_by_default()
{
    init_test_logging();

    // A native run with no exit frame anchoring it, mid-stack. The helper
    // frame stretches the chain so it is non-empty.
    let helper = RawFrame::explicit(
        ExplicitFrame::new(Address::new(0x1900), ExplicitFrameKind::HelperMethod),
        RegisterSnapshot::at(Address::new(0x1800)),
    );
    let frames = vec![managed(1, 0x1000), marker(0x1800), helper, managed(2, 0x2000)];

    let (outcome, records) =
        collect_walk(frames.clone(), WalkOptions::default(), WalkConfig::default());

    assert_eq!(outcome, WalkOutcome::Completed);
    assert!(
        records.iter().all(|r| r.chain_reason != ChainReason::EnterUnmanaged),
        "unanchored chain should have been dropped"
    );

    // Turning the heuristic off delivers the chain, bracketed by the
    // enter-managed marker for the run below it.
    let config = WalkConfig {
        suppress_unanchored_chains: false,
    };
    let (outcome, records) = collect_walk(frames, WalkOptions::default(), config);

    assert_eq!(outcome, WalkOutcome::Completed);
    assert_eq!(records.len(), 6);
    assert_eq!(records[0].method, Some(MethodId::new(1)));
    assert_eq!(records[1].chain_reason, ChainReason::EnterManaged);
    assert_eq!(records[2].chain_reason, ChainReason::EnterUnmanaged);
    assert_eq!(records[2].fp, FramePointer::from_address(Address::new(0x1900)));
    assert_eq!(records[3].method, Some(MethodId::new(2)));
    assert_eq!(records[4].chain_reason, ChainReason::EnterManaged);
    assert_eq!(records[5].chain_reason, ChainReason::ThreadStart);
}

#[test]
fn test_target_fp_suppresses_leafward_records()
{
    init_test_logging();

    let frames = vec![managed(1, 0x1000), managed(2, 0x2000), managed(3, 0x3000)];
    let options = WalkOptions {
        target_fp: FramePointer::from_address(Address::new(0x2000)),
        ..WalkOptions::default()
    };

    let (outcome, records) = collect_walk(frames, options, WalkConfig::default());

    assert_eq!(outcome, WalkOutcome::Completed);
    let methods: Vec<_> = records.iter().filter_map(|r| r.method).collect();
    assert_eq!(methods, vec![MethodId::new(2), MethodId::new(3)]);
    // Once found, everything rootward flows, terminal chain included.
    assert_eq!(
        records.last().map(|r| r.chain_reason),
        Some(ChainReason::ThreadStart)
    );
}

#[test]
fn test_consumer_abort_stops_delivery()
{
    init_test_logging();

    let mut walker = ScriptedWalker::new(vec![
        managed(1, 0x1000),
        managed(2, 0x2000),
        managed(3, 0x3000),
    ]);
    let thread = walkable_thread();
    let mut seen = Vec::new();

    let outcome = walk_stack(
        &mut walker,
        &thread,
        WalkOptions::default(),
        WalkConfig::default(),
        ArchProfile::funclets(),
        &mut |frame: &FrameInfo| {
            seen.push(frame.clone());
            if seen.len() == 2 {
                WalkControl::Abort
            } else {
                WalkControl::Continue
            }
        },
    );

    assert_eq!(outcome, WalkOutcome::Aborted);
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[1].method, Some(MethodId::new(2)));
    // No terminal chain after an abort.
    assert!(seen.iter().all(|r| r.chain_reason != ChainReason::ThreadStart));
}

#[test]
fn test_funclet_physical_frames_collapse_into_parent()
{
    init_test_logging();

    let mut funclet = managed(1, 0x1000);
    funclet.funclet = true;
    funclet.funclet_parent =
        FuncletParentHint::Known(FramePointer::from_address(Address::new(0x3000)));
    funclet.caller_sp = Some(Address::new(0x1800));

    let mut skipped = managed(2, 0x1800);
    skipped.caller_sp = Some(Address::new(0x2000));

    let mut parent = managed(3, 0x2800);
    parent.caller_sp = Some(Address::new(0x3000));

    let (outcome, records) = collect_walk(
        vec![funclet, skipped, parent],
        WalkOptions::default(),
        WalkConfig::default(),
    );

    assert_eq!(outcome, WalkOutcome::Completed);
    let methods: Vec<_> = records.iter().filter_map(|r| r.method).collect();
    assert_eq!(methods, vec![MethodId::new(1), MethodId::new(3)]);
    assert!(records[0].is_funclet);
    assert!(!records[0].is_filter);
}

#[test]
fn test_func_eval_frame_reports_chain_and_stub()
{
    init_test_logging();

    let func_eval = RawFrame::explicit(
        ExplicitFrame::new(Address::new(0x1000), ExplicitFrameKind::FuncEval { show: true }),
        RegisterSnapshot::at(Address::new(0x900)),
    );
    let frames = vec![func_eval, managed(1, 0x2000)];

    let options = WalkOptions {
        provide_internal_frames: true,
        ..WalkOptions::default()
    };
    let (outcome, records) = collect_walk(frames.clone(), options, WalkConfig::default());

    assert_eq!(outcome, WalkOutcome::Completed);
    assert_eq!(records.len(), 5);
    assert_eq!(records[0].stub_type, StubFrameType::FuncEval);
    assert_eq!(records[0].frame_address, Some(Address::new(0x1000)));
    assert_eq!(records[1].chain_reason, ChainReason::FuncEval);
    assert!(records[1].internal);
    assert_eq!(records[2].method, Some(MethodId::new(1)));

    // Without internal frames the evaluation still shows as a chain, but
    // no stub record precedes it.
    let (_, plain) = collect_walk(frames, WalkOptions::default(), WalkConfig::default());
    assert_eq!(plain[0].chain_reason, ChainReason::FuncEval);
    assert!(plain.iter().all(|r| r.stub_type == StubFrameType::None));
}

#[test]
fn test_hidden_func_eval_is_not_reported()
{
    init_test_logging();

    let func_eval = RawFrame::explicit(
        ExplicitFrame::new(
            Address::new(0x1000),
            ExplicitFrameKind::FuncEval { show: false },
        ),
        RegisterSnapshot::at(Address::new(0x900)),
    );
    let frames = vec![func_eval, managed(1, 0x2000)];

    let options = WalkOptions {
        provide_internal_frames: true,
        ..WalkOptions::default()
    };
    let (_, records) = collect_walk(frames, options, WalkConfig::default());

    assert!(records.iter().all(|r| r.chain_reason != ChainReason::FuncEval));
    assert!(records.iter().all(|r| r.stub_type != StubFrameType::FuncEval));
}

#[test]
fn test_unstarted_thread_gets_terminal_chain_only()
{
    init_test_logging();

    let mut walker = ScriptedWalker::new(vec![managed(1, 0x1000)]);
    let mut thread = walkable_thread();
    thread.started = false;

    let mut records = Vec::new();
    let outcome = walk_stack(
        &mut walker,
        &thread,
        WalkOptions::default(),
        WalkConfig::default(),
        ArchProfile::funclets(),
        &mut |frame: &FrameInfo| {
            records.push(frame.clone());
            WalkControl::Continue
        },
    );

    assert_eq!(outcome, WalkOutcome::Completed);
    assert_eq!(walker.visited, 0);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].chain_reason, ChainReason::ThreadStart);
    assert_eq!(records[0].fp, FramePointer::from_address(Address::new(0xf_0000)));
}

#[test]
fn test_failed_walk_still_delivers_a_closed_stack()
{
    init_test_logging();

    let mut walker = ScriptedWalker::failing(vec![managed(1, 0x1000)]);
    let thread = walkable_thread();
    let mut records = Vec::new();

    let outcome = walk_stack(
        &mut walker,
        &thread,
        WalkOptions::default(),
        WalkConfig::default(),
        ArchProfile::funclets(),
        &mut |frame: &FrameInfo| {
            records.push(frame.clone());
            WalkControl::Continue
        },
    );

    assert_eq!(outcome, WalkOutcome::Completed);
    assert_eq!(records[0].method, Some(MethodId::new(1)));
    assert_eq!(
        records.last().map(|r| r.chain_reason),
        Some(ChainReason::ThreadStart)
    );
}
