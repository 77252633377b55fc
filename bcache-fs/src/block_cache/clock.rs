//! 时钟（第二次机会）换出算法
//!
//! 从时钟指针出发绕环检查槽位，每个槽位只做非阻塞的加锁尝试：
//! - 被别人锁住：视作正在使用，跳过；
//! - 时钟位为 1：清零后放过，给它第二次机会；
//! - 时钟位为 0：选为牺牲者，保持加锁返回。
//!
//! 每转一圈至少清掉一个时钟位，所以只要不是所有槽位都被一直占用，扫描就能结束。

use core::hint;

use spin::{Mutex, MutexGuard};

use super::directory::Directory;
use super::slot::Slot;

/// 在持有目录锁的前提下选出牺牲者，返回其目录项位置和已加锁的槽位。
///
/// 时钟指针越过了牺牲者。
pub fn find_victim<'a>(
    slots: &'a [Mutex<Slot>],
    dir: &mut Directory,
) -> (usize, MutexGuard<'a, Slot>) {
    assert!(!dir.is_empty(), "clock scan over an empty cache directory");

    let mut scanned = 0;
    loop {
        let (pos, entry) = dir.current();
        dir.advance();

        if let Some(mut slot) = slots[entry.slot].try_lock() {
            if !slot.second_chance() {
                return (pos, slot);
            }
        }

        scanned += 1;
        if scanned % dir.len() == 0 {
            hint::spin_loop();
        }
    }
}
