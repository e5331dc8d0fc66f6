// author: kodeholic (powered by Claude)
// FloorQueue — 발언 대기열
// priority 내림차순, 동일 priority는 도착 순서(FIFO)

use std::collections::VecDeque;

use crate::error::{FloorError, FloorResult};
use crate::protocol::message::{FloorIndicator, Priority, Ssrc};

/// 대기열 항목 — Floor Request가 Deny 대신 Queue에 들어올 때
#[derive(Debug, Clone, PartialEq)]
pub struct QueueEntry {
    pub ssrc:      Ssrc,
    pub priority:  Priority,
    pub indicator: FloorIndicator,
    /// 도착 순번 — 동일 priority의 공정성 보장
    pub arrival:   u64,
}

#[derive(Debug, Clone)]
pub struct FloorQueue {
    entries:  VecDeque<QueueEntry>,
    capacity: usize,
    arrivals: u64,
}

impl FloorQueue {
    pub fn new(capacity: usize) -> Self {
        Self { entries: VecDeque::new(), capacity, arrivals: 0 }
    }

    /// 대기열에 요청 추가 — priority 내림차순 삽입 (높은 priority가 앞)
    /// 같은 ssrc가 이미 있으면 거부. 반환값은 1-based 순위
    pub fn enqueue(&mut self, ssrc: Ssrc, priority: Priority, indicator: FloorIndicator) -> FloorResult<usize> {
        if self.contains(ssrc) {
            return Err(FloorError::AlreadyQueued(ssrc));
        }
        if self.entries.len() >= self.capacity {
            return Err(FloorError::QueueFull(self.capacity));
        }
        self.arrivals += 1;
        let entry = QueueEntry { ssrc, priority, indicator, arrival: self.arrivals };
        let pos = self.entries.iter().position(|e| e.priority < entry.priority)
            .unwrap_or(self.entries.len());
        self.entries.insert(pos, entry);
        Ok(pos + 1)
    }

    /// 다음 후보 꺼내기 (Release/Revoke 후 승격 대상)
    pub fn dequeue_highest(&mut self) -> Option<QueueEntry> {
        self.entries.pop_front()
    }

    /// 특정 ssrc 제거 (명시적 취소, 연결 종료). 제거했으면 true
    pub fn remove(&mut self, ssrc: Ssrc) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.ssrc != ssrc);
        before != self.entries.len()
    }

    /// 대기열 내 ssrc의 순서 반환 (1-based, 없으면 None)
    pub fn position_of(&self, ssrc: Ssrc) -> Option<usize> {
        self.entries.iter().position(|e| e.ssrc == ssrc).map(|i| i + 1)
    }

    pub fn get(&self, ssrc: Ssrc) -> Option<&QueueEntry> {
        self.entries.iter().find(|e| e.ssrc == ssrc)
    }

    pub fn peek(&self) -> Option<&QueueEntry> {
        self.entries.front()
    }

    pub fn contains(&self, ssrc: Ssrc) -> bool {
        self.entries.iter().any(|e| e.ssrc == ssrc)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueueEntry> {
        self.entries.iter()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// 전체 비우기 — 비운 항목 반환 (Deny 통지용)
    pub fn drain(&mut self) -> Vec<QueueEntry> {
        self.entries.drain(..).collect()
    }
}
