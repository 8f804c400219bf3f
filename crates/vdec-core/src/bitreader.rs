//! 比特流读取器.
//!
//! 按大端位序 (MSB first) 从字节缓冲区读取数据, 供 H.264 参数集解析使用.
//! 读取越界时返回 [`VdecError::Eof`], 调用方据此区分"数据不完整"与"数据非法".

use crate::{VdecError, VdecResult};

/// 比特流读取器
///
/// # 示例
/// ```
/// use vdec_core::BitReader;
///
/// let data = [0b10110001, 0b01010101];
/// let mut br = BitReader::new(&data);
/// assert_eq!(br.read_bits(4).unwrap(), 0b1011);
/// assert!(!br.read_flag().unwrap());
/// assert_eq!(br.read_bits(3).unwrap(), 0b001);
/// assert_eq!(br.bits_left(), 8);
/// ```
pub struct BitReader<'a> {
    data: &'a [u8],
    /// 当前字节索引
    byte_pos: usize,
    /// 当前字节中的位位置 (0-7, 0 表示最高位)
    bit_pos: u8,
}

impl<'a> BitReader<'a> {
    /// 创建新的比特流读取器
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            byte_pos: 0,
            bit_pos: 0,
        }
    }

    /// 已读取的总位数
    pub fn bits_read(&self) -> usize {
        self.byte_pos * 8 + self.bit_pos as usize
    }

    /// 剩余可读位数
    pub fn bits_left(&self) -> usize {
        (self.data.len() * 8).saturating_sub(self.bits_read())
    }

    /// 是否已到达末尾
    pub fn is_eof(&self) -> bool {
        self.bits_left() == 0
    }

    /// 读取 1 个位
    pub fn read_bit(&mut self) -> VdecResult<u32> {
        let Some(&byte) = self.data.get(self.byte_pos) else {
            return Err(VdecError::Eof);
        };

        let bit = (byte >> (7 - self.bit_pos)) & 1;
        self.bit_pos += 1;
        if self.bit_pos == 8 {
            self.bit_pos = 0;
            self.byte_pos += 1;
        }

        Ok(u32::from(bit))
    }

    /// 读取 1 个位并转换为布尔标志
    pub fn read_flag(&mut self) -> VdecResult<bool> {
        Ok(self.read_bit()? == 1)
    }

    /// 读取 N 个位 (最多 32 位), 返回值的低 N 位有效
    pub fn read_bits(&mut self, n: u32) -> VdecResult<u32> {
        if n == 0 {
            return Ok(0);
        }
        if n > 32 {
            return Err(VdecError::InvalidArgument(format!(
                "read_bits: n={} 超过 32 位",
                n
            )));
        }
        if n as usize > self.bits_left() {
            return Err(VdecError::Eof);
        }

        let mut result: u64 = 0;
        let mut remaining = n;
        while remaining > 0 {
            let available = 8 - u32::from(self.bit_pos);
            let to_read = remaining.min(available);
            let shift = available - to_read;
            let mask = ((1u32 << to_read) - 1) as u8;
            let bits = (self.data[self.byte_pos] >> shift) & mask;

            result = (result << to_read) | u64::from(bits);

            self.bit_pos += to_read as u8;
            if self.bit_pos == 8 {
                self.bit_pos = 0;
                self.byte_pos += 1;
            }
            remaining -= to_read;
        }

        Ok(result as u32)
    }

    /// 跳过 N 个位
    pub fn skip_bits(&mut self, n: u32) -> VdecResult<()> {
        if n as usize > self.bits_left() {
            return Err(VdecError::Eof);
        }

        let total_bits = u64::from(self.bit_pos) + u64::from(n);
        self.byte_pos += (total_bits / 8) as usize;
        self.bit_pos = (total_bits % 8) as u8;
        Ok(())
    }

    /// 对齐到下一个字节边界
    pub fn align_to_byte(&mut self) {
        if self.bit_pos > 0 {
            self.bit_pos = 0;
            self.byte_pos += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_bits_basic() {
        let data = [0b10110001, 0b01010101];
        let mut br = BitReader::new(&data);

        assert_eq!(br.read_bits(1).unwrap(), 1);
        assert_eq!(br.read_bits(1).unwrap(), 0);
        assert_eq!(br.read_bits(2).unwrap(), 0b11);
        assert_eq!(br.read_bits(4).unwrap(), 0b0001);
        assert_eq!(br.read_bits(8).unwrap(), 0b01010101);
        assert!(br.is_eof());
    }

    #[test]
    fn test_read_bits_32_bit() {
        let data = [0xFF, 0x00, 0xFF, 0x00];
        let mut br = BitReader::new(&data);
        assert_eq!(br.read_bits(32).unwrap(), 0xFF00FF00);
    }

    #[test]
    fn test_read_bits_unaligned_32_bit() {
        let data = [0x0F, 0xFF, 0xFF, 0xFF, 0xF0];
        let mut br = BitReader::new(&data);
        br.skip_bits(4).unwrap();
        assert_eq!(br.read_bits(32).unwrap(), 0xFFFF_FFFF);
        assert_eq!(br.bits_left(), 4);
    }

    #[test]
    fn test_read_bits_reject_over_32() {
        let data = [0u8; 8];
        let mut br = BitReader::new(&data);
        assert!(matches!(
            br.read_bits(33),
            Err(VdecError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_skip_and_align() {
        let data = [0b10110001, 0b01010101];
        let mut br = BitReader::new(&data);

        br.skip_bits(3).unwrap();
        br.align_to_byte();
        assert_eq!(br.bits_read(), 8);
        assert_eq!(br.read_bits(8).unwrap(), 0b01010101);
    }

    #[test]
    fn test_eof_error() {
        let data = [0x00];
        let mut br = BitReader::new(&data);

        br.read_bits(8).unwrap();
        assert_eq!(br.read_bit(), Err(VdecError::Eof));
        assert_eq!(br.skip_bits(1), Err(VdecError::Eof));
    }
}
