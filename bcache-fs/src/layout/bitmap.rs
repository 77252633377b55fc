use crate::{BLOCK_BITS, BLOCK_SIZE, BlockCache};

/// 位图区域内块的结构
type BitmapBlock = [u64; BLOCK_BITS / 64];

/// 位图区域，记录每个扇区的分配情况：置位表示已占用
#[derive(Debug)]
pub struct Bitmap {
    /// 位图的起始扇区
    start_sector: u32,
    /// 位图占用扇区数
    sectors: usize,
}

/// 位编号
struct BitId(usize);

impl Bitmap {
    #[inline]
    pub fn new(start_sector: u32, sectors: usize) -> Self {
        Self {
            start_sector,
            sectors,
        }
    }

    /// 位图所能指示的总位数
    #[inline]
    pub fn capacity(&self) -> usize {
        self.sectors * BLOCK_BITS
    }

    /// 把位图区域全部清零
    pub fn zero(&self, cache: &BlockCache) {
        for block_index in 0..self.sectors {
            self.store(cache, block_index, &[0; BLOCK_BITS / 64]);
        }
    }

    /// 在前 `limit` 位中首次适配 `count` 个连续的空位，置位后返回首位编号。
    /// 若找不到，则返回空。
    pub fn alloc(&self, cache: &BlockCache, count: usize, limit: usize) -> Option<usize> {
        assert!(count > 0);
        let limit = limit.min(self.capacity());

        // 当前连续空位段的起点和长度
        let mut run_start = 0;
        let mut run_len = 0;

        for block_index in 0..self.sectors {
            let bitmap_block = self.load(cache, block_index);

            for (group_index, &bits) in bitmap_block.iter().enumerate() {
                // 整组已满，连续段中断
                if bits == u64::MAX {
                    run_len = 0;
                    continue;
                }

                for ingroup_index in 0..64 {
                    let bit = BitId::encode(block_index, group_index, ingroup_index);
                    if bit >= limit {
                        return None;
                    }
                    if bits & (1 << ingroup_index) != 0 {
                        run_len = 0;
                        continue;
                    }

                    if run_len == 0 {
                        run_start = bit;
                    }
                    run_len += 1;
                    if run_len == count {
                        self.update(cache, run_start, count, true);
                        return Some(run_start);
                    }
                }
            }
        }

        None
    }

    pub fn dealloc(&self, cache: &BlockCache, start: usize, count: usize) {
        self.update(cache, start, count, false);
    }

    /// 把 `[start, start + count)` 标记为占用，供格式化保留区域使用
    pub fn reserve(&self, cache: &BlockCache, start: usize, count: usize) {
        self.update(cache, start, count, true);
    }

    pub fn test(&self, cache: &BlockCache, bit: usize) -> bool {
        let (block_index, group_index, ingroup_index) = BitId(bit).decode();
        self.load(cache, block_index)[group_index] & (1 << ingroup_index) != 0
    }

    /// 前 `limit` 位中的空位数
    pub fn count_free(&self, cache: &BlockCache, limit: usize) -> usize {
        let limit = limit.min(self.capacity());
        (0..self.sectors)
            .map(|block_index| {
                let bitmap_block = self.load(cache, block_index);
                let block_start = block_index * BLOCK_BITS;
                (block_start..(block_start + BLOCK_BITS).min(limit))
                    .filter(|&bit| {
                        let (_, group_index, ingroup_index) = BitId(bit).decode();
                        bitmap_block[group_index] & (1 << ingroup_index) == 0
                    })
                    .count()
            })
            .sum()
    }
}

impl Bitmap {
    /// 翻转 `[start, start + count)` 中的每一位，它们原本必须都不是 `used`
    fn update(&self, cache: &BlockCache, start: usize, count: usize, used: bool) {
        let end = start + count;
        assert!(end <= self.capacity());

        let mut bit = start;
        while bit < end {
            let (block_index, _, _) = BitId(bit).decode();
            let block_end = ((block_index + 1) * BLOCK_BITS).min(end);
            let mut bitmap_block = self.load(cache, block_index);

            for bit in bit..block_end {
                let (_, group_index, ingroup_index) = BitId(bit).decode();
                let mask = 1 << ingroup_index;
                // 编号一定得有对应的位
                assert_eq!(
                    bitmap_block[group_index] & mask != 0,
                    !used,
                    "bit {bit} is already {}",
                    if used { "used" } else { "free" }
                );
                bitmap_block[group_index] ^= mask;
            }

            self.store(cache, block_index, &bitmap_block);
            bit = block_end;
        }
    }

    fn load(&self, cache: &BlockCache, block_index: usize) -> BitmapBlock {
        let mut raw = [0; BLOCK_SIZE];
        cache.read(self.start_sector + block_index as u32, 0, &mut raw);
        core::array::from_fn(|group_index| {
            let mut bits = [0; 8];
            bits.copy_from_slice(&raw[group_index * 8..group_index * 8 + 8]);
            u64::from_le_bytes(bits)
        })
    }

    fn store(&self, cache: &BlockCache, block_index: usize, bitmap_block: &BitmapBlock) {
        let mut raw = [0; BLOCK_SIZE];
        for (chunk, bits) in raw.chunks_exact_mut(8).zip(bitmap_block) {
            chunk.copy_from_slice(&bits.to_le_bytes());
        }
        cache.write(self.start_sector + block_index as u32, 0, &raw);
    }
}

impl BitId {
    /// 线性映射编码得到位编号
    #[inline]
    fn encode(block_index: usize, group_index: usize, ingroup_index: usize) -> usize {
        block_index * BLOCK_BITS + group_index * 64 + ingroup_index
    }

    fn decode(self) -> (usize, usize, usize) {
        let mut bit = self.0;

        let block_index = bit / BLOCK_BITS;
        bit %= BLOCK_BITS;
        (block_index, bit / 64, bit % 64)
    }
}
