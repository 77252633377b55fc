//! 后台写回
//!
//! 写回线程按固定周期醒来，把能立刻锁住的脏块写回设备。
//! 它不参与请求路径，只在写回单个槽位时短暂持有其锁。

use alloc::sync::Arc;
use core::ops::ControlFlow;

use super::BlockCache;

pub struct WriteBehind {
    cache: Arc<BlockCache>,
    period: u64,
}

impl WriteBehind {
    #[inline]
    pub fn new(cache: Arc<BlockCache>) -> Self {
        let period = cache.config().write_behind_ticks;
        Self { cache, period }
    }

    #[inline]
    pub fn period(&self) -> u64 {
        self.period
    }

    /// 写回循环。
    ///
    /// `wait` 睡眠给定的滴答数；内核里它永远返回 [`ControlFlow::Continue`]，
    /// 循环也就永不结束。
    pub fn run(&self, mut wait: impl FnMut(u64) -> ControlFlow<()>) {
        log::debug!("write-behind: started, period={} ticks", self.period);

        while wait(self.period).is_continue() {
            let flushed = self.cache.write_behind();
            if flushed > 0 {
                log::debug!("write-behind: flushed {flushed} dirty sectors");
            }
        }

        log::debug!("write-behind: stopped");
    }
}
