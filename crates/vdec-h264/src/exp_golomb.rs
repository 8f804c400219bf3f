//! Exp-Golomb 可变长编码.
//!
//! - `ue(v)`: 无符号, `leading_zeros` 个 0 + 1 + `leading_zeros` 位后缀
//! - `se(v)`: 有符号, 按 0→0, 1→1, 2→-1, 3→2, 4→-2 ... 映射到 `ue(v)`

use vdec_core::{BitReader, BitWriter, VdecError, VdecResult};

/// 读取无符号 Exp-Golomb 编码值 ue(v)
pub fn read_ue(br: &mut BitReader) -> VdecResult<u32> {
    let mut leading_zeros = 0u32;
    while br.read_bit()? == 0 {
        leading_zeros += 1;
        if leading_zeros > 31 {
            return Err(VdecError::MalformedBitstream(
                "H.264: Exp-Golomb 前导零过多".into(),
            ));
        }
    }

    if leading_zeros == 0 {
        return Ok(0);
    }

    let suffix = br.read_bits(leading_zeros)?;
    let value = ((1u64 << leading_zeros) - 1) + u64::from(suffix);
    u32::try_from(value)
        .map_err(|_| VdecError::MalformedBitstream(format!("H.264: ue(v) 溢出, value={}", value)))
}

/// 读取有符号 Exp-Golomb 编码值 se(v)
pub fn read_se(br: &mut BitReader) -> VdecResult<i32> {
    let code = read_ue(br)?;
    let value = code.div_ceil(2) as i32;
    if code & 1 == 0 { Ok(-value) } else { Ok(value) }
}

/// 写入无符号 Exp-Golomb 编码值 ue(v)
pub fn write_ue(bw: &mut BitWriter, value: u32) {
    let code = u64::from(value) + 1;
    let len = 64 - code.leading_zeros();
    for _ in 1..len {
        bw.write_bit(0);
    }
    for shift in (0..len).rev() {
        bw.write_bit((code >> shift) as u32 & 1);
    }
}

/// 写入有符号 Exp-Golomb 编码值 se(v)
pub fn write_se(bw: &mut BitWriter, value: i32) {
    let code = if value > 0 {
        (value as u32) * 2 - 1
    } else {
        value.unsigned_abs() * 2
    };
    write_ue(bw, code);
}
