// author: kodeholic (powered by Claude)
// 재전송 횟수 카운터 (C7, C20, C100, C101, C104)

#[derive(Debug, Clone)]
pub struct Counter {
    name:  &'static str,
    value: u32,
    limit: u32,
}

impl Counter {
    pub fn new(name: &'static str, limit: u32) -> Self {
        Self { name, value: 0, limit }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn value(&self) -> u32 {
        self.value
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn set_limit(&mut self, limit: u32) {
        self.limit = limit;
    }

    /// 1 증가. 한계에 도달하는 바로 그 스텝에서만 true
    /// 한계 이후 추가 증가는 값을 유지하고 false — reset() 전까지 재통지 없음
    pub fn increment(&mut self) -> bool {
        if self.value >= self.limit {
            return false;
        }
        self.value += 1;
        self.value == self.limit
    }

    pub fn is_limit_reached(&self) -> bool {
        self.value >= self.limit
    }

    pub fn reset(&mut self) {
        self.value = 0;
    }
}
