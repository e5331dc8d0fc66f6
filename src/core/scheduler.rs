// author: kodeholic (powered by Claude)
// 논리 시계 스케줄러 — 벽시계 대신 소유자가 시간을 전진시킴
//
// 콜백을 직접 실행하지 않음. 소유자(CallSession)가 pop_due()로 하나씩 꺼내
// 디스패치하므로 모든 전이는 서로 겹치지 않는 단일 스텝으로 실행됨.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// 예약된 이벤트 — (at, seq) 기준 최소 힙
struct Scheduled<E> {
    at:    u64,
    seq:   u64,
    event: E,
}

impl<E> PartialEq for Scheduled<E> {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}

impl<E> Eq for Scheduled<E> {}

impl<E> PartialOrd for Scheduled<E> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<E> Ord for Scheduled<E> {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap은 최대 힙 — 역순 비교로 가장 이른 이벤트가 top
        other.at.cmp(&self.at).then_with(|| other.seq.cmp(&self.seq))
    }
}

pub struct Scheduler<E> {
    now:  u64,
    seq:  u64,
    heap: BinaryHeap<Scheduled<E>>,
}

impl<E> Scheduler<E> {
    pub fn new() -> Self {
        Self { now: 0, seq: 0, heap: BinaryHeap::new() }
    }

    /// 현재 논리 시각 (ms)
    pub fn now(&self) -> u64 {
        self.now
    }

    /// now + delay 시각에 이벤트 예약. 같은 시각은 예약 순서대로 꺼냄
    pub fn schedule(&mut self, delay: u64, event: E) {
        let at = self.now.saturating_add(delay);
        self.seq += 1;
        self.heap.push(Scheduled { at, seq: self.seq, event });
    }

    /// until 이전(포함)에 만기된 가장 이른 이벤트를 꺼내고 시계를 그 시각으로 이동
    pub fn pop_due(&mut self, until: u64) -> Option<E> {
        match self.heap.peek() {
            Some(top) if top.at <= until => {}
            _ => return None,
        }
        let next = self.heap.pop()?;
        if next.at > self.now {
            self.now = next.at;
        }
        Some(next.event)
    }

    /// 만기 이벤트를 모두 처리한 뒤 시계를 until로 맞춤
    pub fn settle(&mut self, until: u64) {
        if until > self.now {
            self.now = until;
        }
    }

    /// 다음 이벤트 예정 시각
    pub fn next_deadline(&self) -> Option<u64> {
        self.heap.peek().map(|s| s.at)
    }

    pub fn pending(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// 예약 전부 폐기 — 호 종료 시 잔여 만료가 남지 않도록
    pub fn clear(&mut self) {
        self.heap.clear();
    }
}

impl<E> Default for Scheduler<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pops_in_deadline_order() {
        let mut s = Scheduler::new();
        s.schedule(30, "c");
        s.schedule(10, "a");
        s.schedule(20, "b");
        assert_eq!(s.pop_due(100), Some("a"));
        assert_eq!(s.now(), 10);
        assert_eq!(s.pop_due(100), Some("b"));
        assert_eq!(s.pop_due(100), Some("c"));
        assert_eq!(s.pop_due(100), None);
    }

    #[test]
    fn equal_deadline_is_fifo() {
        let mut s = Scheduler::new();
        for i in 0..5 {
            s.schedule(0, i);
        }
        let order: Vec<_> = std::iter::from_fn(|| s.pop_due(0)).collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn not_due_stays_queued() {
        let mut s = Scheduler::new();
        s.schedule(50, ());
        assert_eq!(s.pop_due(49), None);
        assert_eq!(s.pending(), 1);
        s.settle(49);
        assert_eq!(s.now(), 49);
        assert_eq!(s.next_deadline(), Some(50));
    }

    #[test]
    fn schedule_is_relative_to_now() {
        let mut s = Scheduler::new();
        s.settle(100);
        s.schedule(5, ());
        assert_eq!(s.next_deadline(), Some(105));
    }

    #[test]
    fn settle_never_moves_backwards() {
        let mut s: Scheduler<()> = Scheduler::new();
        s.settle(10);
        s.settle(5);
        assert_eq!(s.now(), 10);
    }

    #[test]
    fn clear_drops_everything() {
        let mut s = Scheduler::new();
        s.schedule(1, ());
        s.schedule(2, ());
        s.clear();
        assert!(s.is_empty());
        assert_eq!(s.pop_due(u64::MAX), None);
    }
}
