use std::sync::Arc;

use l4core::config::DEFAULT_TIME_SLICE;
use l4core::ThreadState;
use libl4::{Error, SchedParam};

mod common;
use common::*;

#[test]
fn test_idle_runs_on_an_empty_cpu() {
    let cpus = cpus(2, true);
    for cpu in [CPU0, CPU1] {
        let idle = cpus.cpu(cpu).lock().idle().clone();
        let picked = cpus.cpu(cpu).schedule();
        assert!(Arc::ptr_eq(&picked, &idle));
        assert!(idle.is_ready());
    }
}

#[test]
fn test_idle_thread_cannot_be_destroyed() {
    let cpus = cpus(1, true);
    let idle = cpus.cpu(CPU0).lock().idle().clone();

    assert_eq!(cpus.destroy_thread(CPU0, &idle), Err(Error::EInval));
    assert!(!idle.is_dead());
    assert!(idle.is_ready());
    assert!(Arc::ptr_eq(&cpus.cpu(CPU0).schedule(), &idle));
}

#[test]
fn test_highest_priority_runs() {
    let cpus = cpus(1, true);
    let lo = fp_thread(&cpus, CPU0, 10);
    let hi = fp_thread(&cpus, CPU0, 200);
    let w = wfq_thread(&cpus, CPU0, 1_000, 4);

    assert!(Arc::ptr_eq(&cpus.cpu(CPU0).schedule(), &hi));

    cpus.destroy_thread(CPU0, &hi).unwrap();
    assert!(Arc::ptr_eq(&cpus.cpu(CPU0).schedule(), &lo));

    // WFQ only runs once no fixed-priority thread is ready.
    lo.state_del_dirty(ThreadState::READY);
    assert!(Arc::ptr_eq(&cpus.cpu(CPU0).schedule(), &w));
    assert!(!in_ready_list(&cpus, &lo));
}

#[test]
fn test_equal_priority_round_robin_on_tick() {
    let cpus = cpus(1, true);
    let a = fp_thread(&cpus, CPU0, 10);
    let b = fp_thread(&cpus, CPU0, 10);
    let cpu = cpus.cpu(CPU0);

    assert!(Arc::ptr_eq(&cpu.schedule(), &a));
    assert!(!cpu.tick(1_000));
    assert!(Arc::ptr_eq(&cpu.schedule(), &a));

    assert!(cpu.tick(DEFAULT_TIME_SLICE as u64));
    assert!(a.state().contains(ThreadState::NEED_RESCHED));
    assert!(Arc::ptr_eq(&cpu.schedule(), &b));
    assert!(!a.state().contains(ThreadState::NEED_RESCHED));

    assert!(cpu.tick(DEFAULT_TIME_SLICE as u64));
    assert!(Arc::ptr_eq(&cpu.schedule(), &a));
}

#[test]
fn test_wfq_threads_share_by_deadline() {
    let cpus = cpus(1, true);
    let heavy = wfq_thread(&cpus, CPU0, 1_000, 4);
    let light = wfq_thread(&cpus, CPU0, 1_000, 1);
    let cpu = cpus.cpu(CPU0);

    // Count who runs over a number of expired slices.
    let (mut h, mut l) = (0, 0);
    for _ in 0..10 {
        let t = cpu.schedule();
        if Arc::ptr_eq(&t, &heavy) {
            h += 1;
        } else if Arc::ptr_eq(&t, &light) {
            l += 1;
        }
        assert!(cpu.tick(1_000));
    }
    assert_eq!(h + l, 10);
    assert!(h > l, "heavy={} light={}", h, l);
}

#[test]
fn test_set_params_while_queued() {
    let cpus = cpus(1, true);
    let a = fp_thread(&cpus, CPU0, 10);
    let b = fp_thread(&cpus, CPU0, 20);
    assert!(Arc::ptr_eq(&cpus.cpu(CPU0).schedule(), &b));

    cpus.set_sched_params(&a, &SchedParam::fixed_prio(30, 0)).unwrap();
    assert!(in_ready_list(&cpus, &a));
    assert_eq!(queued(&cpus, CPU0), 2);
    assert!(Arc::ptr_eq(&cpus.cpu(CPU0).schedule(), &a));

    cpus.set_sched_params(&a, &SchedParam::wfq(1_000, 1)).unwrap();
    assert!(in_ready_list(&cpus, &a));
    assert_eq!(queued(&cpus, CPU0), 2);
    assert!(Arc::ptr_eq(&cpus.cpu(CPU0).schedule(), &b));

    assert_eq!(cpus.set_sched_params(&a, &SchedParam::wfq(0, 1)), Err(Error::EInval));
    assert!(in_ready_list(&cpus, &a));
}

#[test]
fn test_create_rejects_bad_input() {
    let cpus = cpus(1, true);
    assert_eq!(
        cpus.create_thread(CPU1, &SchedParam::fixed_prio(1, 0)).err(),
        Some(Error::EInval)
    );
    assert_eq!(
        cpus.create_thread(CPU0, &SchedParam::wfq(100, 0)).err(),
        Some(Error::EInval)
    );

    let idle = cpus.cpu(CPU0).lock().idle().clone();
    assert_eq!(cpus.set_sched_params(&idle, &SchedParam::fixed_prio(5, 0)), Err(Error::EInval));
}

#[test]
fn test_created_thread_waits_for_activation() {
    let cpus = cpus(1, true);
    let t = cpus.create_thread(CPU0, &SchedParam::fixed_prio(50, 0)).unwrap();
    assert!(!t.is_ready());
    assert!(!in_ready_list(&cpus, &t));
    assert!(!Arc::ptr_eq(&cpus.cpu(CPU0).schedule(), &t));

    cpus.activate(&t);
    assert!(Arc::ptr_eq(&cpus.cpu(CPU0).schedule(), &t));
}

#[test]
#[should_panic(expected = "nested schedule")]
fn test_schedule_does_not_nest() {
    let cpus = cpus(1, true);
    let _pass = cpus.cpu(CPU0).begin_schedule();
    cpus.cpu(CPU0).schedule();
}

#[test]
fn test_destroying_the_running_thread() {
    let cpus = cpus(1, true);
    let t = fp_thread(&cpus, CPU0, 50);
    assert!(Arc::ptr_eq(&cpus.cpu(CPU0).schedule(), &t));

    cpus.destroy_thread(CPU0, &t).unwrap();
    assert!(t.is_dead());
    assert!(!cpus.cpu(CPU0).lock().rq().contains(t.sched()));
    let idle = cpus.cpu(CPU0).lock().idle().clone();
    assert!(Arc::ptr_eq(&cpus.cpu(CPU0).schedule(), &idle));
}
