// author: kodeholic (powered by Claude)
// FloorServer — 다중 호 관리 (CallId → CallSession)
//
// 호마다 독립 스케줄러를 가지므로 서버는 공통 논리 시각(now)만 보관하고
// advance_to()로 모든 호를 같은 시각까지 전진시킴.
// 새 호는 생성 즉시 서버 시각에 맞춰 settle.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{info, trace};

use crate::config::{self, SessionConfig};
use crate::error::{FloorError, FloorResult};
use crate::protocol::message::{CallId, CallType};
use crate::session::CallSession;
use crate::trace::FloorObserver;

// ----------------------------------------------------------------------------
// [CallIdAllocator]
// ----------------------------------------------------------------------------

/// 호 식별자 발급기 — 범위 소진 시 CallIdOutOfRange
#[derive(Debug, Clone)]
pub struct CallIdAllocator {
    first: CallId,
    last:  CallId,
    /// 다음 발급 값 (last 초과 표현을 위해 u32)
    next:  u32,
}

impl CallIdAllocator {
    pub fn new(first: CallId, last: CallId) -> Self {
        Self { first, last, next: first as u32 }
    }

    pub fn allocate(&mut self) -> FloorResult<CallId> {
        if self.next > self.last as u32 {
            return Err(FloorError::CallIdOutOfRange(self.last));
        }
        let id = self.next as CallId;
        self.next += 1;
        Ok(id)
    }

    /// 이미 발급된 id인지 (해제 여부와 무관)
    pub fn is_allocated(&self, id: CallId) -> bool {
        id >= self.first && (id as u32) < self.next
    }

    pub fn allocated(&self) -> usize {
        (self.next - self.first as u32) as usize
    }
}

impl Default for CallIdAllocator {
    fn default() -> Self {
        Self::new(config::CALL_ID_FIRST, config::CALL_ID_LAST)
    }
}

// ----------------------------------------------------------------------------
// [FloorServer]
// ----------------------------------------------------------------------------

pub struct FloorServer {
    config:    SessionConfig,
    allocator: CallIdAllocator,
    calls:     BTreeMap<CallId, CallSession>,
    observers: Vec<Arc<dyn FloorObserver>>,
    now:       u64,
}

impl FloorServer {
    pub fn new(config: SessionConfig) -> Self {
        Self::with_allocator(config, CallIdAllocator::default())
    }

    pub fn with_allocator(config: SessionConfig, allocator: CallIdAllocator) -> Self {
        trace!("Initializing FloorServer");
        Self { config, allocator, calls: BTreeMap::new(), observers: Vec::new(), now: 0 }
    }

    pub fn now(&self) -> u64 {
        self.now
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// 기존 호 + 이후 생성되는 호 모두에 관찰자 등록
    pub fn subscribe(&mut self, observer: Arc<dyn FloorObserver>) {
        for call in self.calls.values_mut() {
            call.subscribe(Arc::clone(&observer));
        }
        self.observers.push(observer);
    }

    pub fn create_call(&mut self, call_type: CallType) -> FloorResult<CallId> {
        let call_id = self.allocator.allocate()?;
        let mut call = CallSession::new(call_id, call_type, self.config.clone());
        call.advance_to(self.now);
        for observer in &self.observers {
            call.subscribe(Arc::clone(observer));
        }
        self.calls.insert(call_id, call);
        info!("[call] created: call={} type={}", call_id, call_type);
        Ok(call_id)
    }

    pub fn call(&self, call_id: CallId) -> FloorResult<&CallSession> {
        if !self.allocator.is_allocated(call_id) {
            return Err(FloorError::CallIdOutOfRange(call_id));
        }
        self.calls.get(&call_id).ok_or(FloorError::CallNotFound(call_id))
    }

    pub fn call_mut(&mut self, call_id: CallId) -> FloorResult<&mut CallSession> {
        if !self.allocator.is_allocated(call_id) {
            return Err(FloorError::CallIdOutOfRange(call_id));
        }
        self.calls.get_mut(&call_id).ok_or(FloorError::CallNotFound(call_id))
    }

    /// 호 종료 + 제거
    pub fn release_call(&mut self, call_id: CallId) -> FloorResult<()> {
        let call = self.call_mut(call_id)?;
        call.release();
        self.calls.remove(&call_id);
        info!("[call] removed: call={}", call_id);
        Ok(())
    }

    /// 모든 호를 t까지 전진 (과거 시각이면 무시)
    pub fn advance_to(&mut self, t: u64) {
        if t < self.now {
            return;
        }
        self.now = t;
        for call in self.calls.values_mut() {
            call.advance_to(t);
        }
    }

    pub fn advance_by(&mut self, delta: u64) {
        self.advance_to(self.now.saturating_add(delta));
    }

    pub fn call_ids(&self) -> Vec<CallId> {
        self.calls.keys().copied().collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.len()
    }

    /// 발언 중(Taken / PendingRevoke)인 호 수
    pub fn count_floor_taken(&self) -> usize {
        self.calls.values().filter(|c| c.arbitrator().is_floor_occupied()).count()
    }
}
