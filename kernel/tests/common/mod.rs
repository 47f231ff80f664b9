#![allow(dead_code)]

use std::sync::Arc;

use l4core::ipc::{self, RecvResult};
use l4core::{CpuId, CpuSet, SchedConfig, SchedId, Thread};
use libl4::SchedParam;

pub const CPU0: CpuId = CpuId::new(0);
pub const CPU1: CpuId = CpuId::new(1);

pub fn cpus(count: usize, ipc_shortcut: bool) -> CpuSet {
    CpuSet::new(count, SchedConfig { ipc_shortcut })
}

/// Ready fixed-priority thread on `cpu`.
pub fn fp_thread(cpus: &CpuSet, cpu: CpuId, prio: u32) -> Arc<Thread> {
    let t = cpus.create_thread(cpu, &SchedParam::fixed_prio(prio, 0)).unwrap();
    cpus.activate(&t);
    t
}

/// Ready WFQ thread on `cpu`.
pub fn wfq_thread(cpus: &CpuSet, cpu: CpuId, quantum: u32, weight: u32) -> Arc<Thread> {
    let t = cpus.create_thread(cpu, &SchedParam::wfq(quantum, weight)).unwrap();
    cpus.activate(&t);
    t
}

/// Put `t` into an open receive with nothing queued, then let its CPU
/// pick someone else.
pub fn block_in_receive(cpus: &CpuSet, t: &Arc<Thread>) {
    let res = ipc::receive(cpus, t.home_cpu(), t, None, None);
    assert_eq!(res, RecvResult::Blocked);
    cpus.cpu(t.home_cpu()).schedule();
}

pub fn next_to_run(cpus: &CpuSet, cpu: CpuId) -> Option<SchedId> {
    cpus.cpu(cpu).lock().rq_mut().next_to_run()
}

pub fn in_ready_list(cpus: &CpuSet, t: &Thread) -> bool {
    cpus.cpu(t.home_cpu()).lock().rq().context(t.sched()).in_ready_list()
}

pub fn queued(cpus: &CpuSet, cpu: CpuId) -> usize {
    cpus.cpu(cpu).lock().rq().len()
}

/// Virtual deadline of a WFQ thread, read on its home CPU.
pub fn wfq_deadline(cpus: &CpuSet, t: &Thread) -> Option<u64> {
    cpus.cpu(t.home_cpu()).lock().rq().context(t.sched()).deadline()
}
