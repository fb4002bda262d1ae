//! Opcode numbering for the gas cost table.
//!
//! The execution context's cost table is an array of `u64` costs indexed by
//! opcode value, bounded by `u16::MAX + 1`. Single-byte opcodes use their
//! binary encoding directly. Prefixed opcode spaces are folded into disjoint
//! u16 ranges so the whole surface fits one table:
//!
//!   GC (0xFB prefix)        -> 0xFB00 + sub-opcode
//!   misc (0xFC prefix)      -> 0xFC00 + sub-opcode
//!   SIMD (0xFD prefix)      -> 0xE000 + sub-opcode
//!   atomics (0xFE prefix)   -> 0xF000 + sub-opcode
//!
//! The loader fills the cost table with the same numbering.

use wasmparser::Operator;

const GC: u16 = 0xFB00;
const MISC: u16 = 0xFC00;
const SIMD: u16 = 0xE000;
const ATOMIC: u16 = 0xF000;

/// Cost-table index for one operator.
pub fn cost_index(op: &Operator) -> u16 {
    match op {
        Operator::Unreachable => 0x00,
        Operator::Nop => 0x01,
        Operator::Block { .. } => 0x02,
        Operator::Loop { .. } => 0x03,
        Operator::If { .. } => 0x04,
        Operator::Else => 0x05,
        Operator::End => 0x0B,
        Operator::Br { .. } => 0x0C,
        Operator::BrIf { .. } => 0x0D,
        Operator::BrTable { .. } => 0x0E,
        Operator::Return => 0x0F,
        Operator::Call { .. } => 0x10,
        Operator::CallIndirect { .. } => 0x11,
        Operator::ReturnCall { .. } => 0x12,
        Operator::ReturnCallIndirect { .. } => 0x13,
        Operator::CallRef { .. } => 0x14,
        Operator::ReturnCallRef { .. } => 0x15,
        Operator::Drop => 0x1A,
        Operator::Select => 0x1B,
        Operator::TypedSelect { .. } => 0x1C,
        Operator::LocalGet { .. } => 0x20,
        Operator::LocalSet { .. } => 0x21,
        Operator::LocalTee { .. } => 0x22,
        Operator::GlobalGet { .. } => 0x23,
        Operator::GlobalSet { .. } => 0x24,
        Operator::TableGet { .. } => 0x25,
        Operator::TableSet { .. } => 0x26,
        Operator::I32Load { .. } => 0x28,
        Operator::I64Load { .. } => 0x29,
        Operator::F32Load { .. } => 0x2A,
        Operator::F64Load { .. } => 0x2B,
        Operator::I32Load8S { .. } => 0x2C,
        Operator::I32Load8U { .. } => 0x2D,
        Operator::I32Load16S { .. } => 0x2E,
        Operator::I32Load16U { .. } => 0x2F,
        Operator::I64Load8S { .. } => 0x30,
        Operator::I64Load8U { .. } => 0x31,
        Operator::I64Load16S { .. } => 0x32,
        Operator::I64Load16U { .. } => 0x33,
        Operator::I64Load32S { .. } => 0x34,
        Operator::I64Load32U { .. } => 0x35,
        Operator::I32Store { .. } => 0x36,
        Operator::I64Store { .. } => 0x37,
        Operator::F32Store { .. } => 0x38,
        Operator::F64Store { .. } => 0x39,
        Operator::I32Store8 { .. } => 0x3A,
        Operator::I32Store16 { .. } => 0x3B,
        Operator::I64Store8 { .. } => 0x3C,
        Operator::I64Store16 { .. } => 0x3D,
        Operator::I64Store32 { .. } => 0x3E,
        Operator::MemorySize { .. } => 0x3F,
        Operator::MemoryGrow { .. } => 0x40,
        Operator::I32Const { .. } => 0x41,
        Operator::I64Const { .. } => 0x42,
        Operator::F32Const { .. } => 0x43,
        Operator::F64Const { .. } => 0x44,
        Operator::I32Eqz => 0x45,
        Operator::I32Eq => 0x46,
        Operator::I32Ne => 0x47,
        Operator::I32LtS => 0x48,
        Operator::I32LtU => 0x49,
        Operator::I32GtS => 0x4A,
        Operator::I32GtU => 0x4B,
        Operator::I32LeS => 0x4C,
        Operator::I32LeU => 0x4D,
        Operator::I32GeS => 0x4E,
        Operator::I32GeU => 0x4F,
        Operator::I64Eqz => 0x50,
        Operator::I64Eq => 0x51,
        Operator::I64Ne => 0x52,
        Operator::I64LtS => 0x53,
        Operator::I64LtU => 0x54,
        Operator::I64GtS => 0x55,
        Operator::I64GtU => 0x56,
        Operator::I64LeS => 0x57,
        Operator::I64LeU => 0x58,
        Operator::I64GeS => 0x59,
        Operator::I64GeU => 0x5A,
        Operator::F32Eq => 0x5B,
        Operator::F32Ne => 0x5C,
        Operator::F32Lt => 0x5D,
        Operator::F32Gt => 0x5E,
        Operator::F32Le => 0x5F,
        Operator::F32Ge => 0x60,
        Operator::F64Eq => 0x61,
        Operator::F64Ne => 0x62,
        Operator::F64Lt => 0x63,
        Operator::F64Gt => 0x64,
        Operator::F64Le => 0x65,
        Operator::F64Ge => 0x66,
        Operator::I32Clz => 0x67,
        Operator::I32Ctz => 0x68,
        Operator::I32Popcnt => 0x69,
        Operator::I32Add => 0x6A,
        Operator::I32Sub => 0x6B,
        Operator::I32Mul => 0x6C,
        Operator::I32DivS => 0x6D,
        Operator::I32DivU => 0x6E,
        Operator::I32RemS => 0x6F,
        Operator::I32RemU => 0x70,
        Operator::I32And => 0x71,
        Operator::I32Or => 0x72,
        Operator::I32Xor => 0x73,
        Operator::I32Shl => 0x74,
        Operator::I32ShrS => 0x75,
        Operator::I32ShrU => 0x76,
        Operator::I32Rotl => 0x77,
        Operator::I32Rotr => 0x78,
        Operator::I64Clz => 0x79,
        Operator::I64Ctz => 0x7A,
        Operator::I64Popcnt => 0x7B,
        Operator::I64Add => 0x7C,
        Operator::I64Sub => 0x7D,
        Operator::I64Mul => 0x7E,
        Operator::I64DivS => 0x7F,
        Operator::I64DivU => 0x80,
        Operator::I64RemS => 0x81,
        Operator::I64RemU => 0x82,
        Operator::I64And => 0x83,
        Operator::I64Or => 0x84,
        Operator::I64Xor => 0x85,
        Operator::I64Shl => 0x86,
        Operator::I64ShrS => 0x87,
        Operator::I64ShrU => 0x88,
        Operator::I64Rotl => 0x89,
        Operator::I64Rotr => 0x8A,
        Operator::F32Abs => 0x8B,
        Operator::F32Neg => 0x8C,
        Operator::F32Ceil => 0x8D,
        Operator::F32Floor => 0x8E,
        Operator::F32Trunc => 0x8F,
        Operator::F32Nearest => 0x90,
        Operator::F32Sqrt => 0x91,
        Operator::F32Add => 0x92,
        Operator::F32Sub => 0x93,
        Operator::F32Mul => 0x94,
        Operator::F32Div => 0x95,
        Operator::F32Min => 0x96,
        Operator::F32Max => 0x97,
        Operator::F32Copysign => 0x98,
        Operator::F64Abs => 0x99,
        Operator::F64Neg => 0x9A,
        Operator::F64Ceil => 0x9B,
        Operator::F64Floor => 0x9C,
        Operator::F64Trunc => 0x9D,
        Operator::F64Nearest => 0x9E,
        Operator::F64Sqrt => 0x9F,
        Operator::F64Add => 0xA0,
        Operator::F64Sub => 0xA1,
        Operator::F64Mul => 0xA2,
        Operator::F64Div => 0xA3,
        Operator::F64Min => 0xA4,
        Operator::F64Max => 0xA5,
        Operator::F64Copysign => 0xA6,
        Operator::I32WrapI64 => 0xA7,
        Operator::I32TruncF32S => 0xA8,
        Operator::I32TruncF32U => 0xA9,
        Operator::I32TruncF64S => 0xAA,
        Operator::I32TruncF64U => 0xAB,
        Operator::I64ExtendI32S => 0xAC,
        Operator::I64ExtendI32U => 0xAD,
        Operator::I64TruncF32S => 0xAE,
        Operator::I64TruncF32U => 0xAF,
        Operator::I64TruncF64S => 0xB0,
        Operator::I64TruncF64U => 0xB1,
        Operator::F32ConvertI32S => 0xB2,
        Operator::F32ConvertI32U => 0xB3,
        Operator::F32ConvertI64S => 0xB4,
        Operator::F32ConvertI64U => 0xB5,
        Operator::F32DemoteF64 => 0xB6,
        Operator::F64ConvertI32S => 0xB7,
        Operator::F64ConvertI32U => 0xB8,
        Operator::F64ConvertI64S => 0xB9,
        Operator::F64ConvertI64U => 0xBA,
        Operator::F64PromoteF32 => 0xBB,
        Operator::I32ReinterpretF32 => 0xBC,
        Operator::I64ReinterpretF64 => 0xBD,
        Operator::F32ReinterpretI32 => 0xBE,
        Operator::F64ReinterpretI64 => 0xBF,
        Operator::I32Extend8S => 0xC0,
        Operator::I32Extend16S => 0xC1,
        Operator::I64Extend8S => 0xC2,
        Operator::I64Extend16S => 0xC3,
        Operator::I64Extend32S => 0xC4,
        Operator::RefNull { .. } => 0xD0,
        Operator::RefIsNull => 0xD1,
        Operator::RefFunc { .. } => 0xD2,
        Operator::RefEq => 0xD3,
        Operator::RefAsNonNull => 0xD4,
        Operator::BrOnNull { .. } => 0xD5,
        Operator::BrOnNonNull { .. } => 0xD6,

        Operator::StructNew { .. } => GC,
        Operator::StructNewDefault { .. } => GC + 1,
        Operator::StructGet { .. } => GC + 2,
        Operator::StructGetS { .. } => GC + 3,
        Operator::StructGetU { .. } => GC + 4,
        Operator::StructSet { .. } => GC + 5,
        Operator::ArrayNew { .. } => GC + 6,
        Operator::ArrayNewDefault { .. } => GC + 7,
        Operator::ArrayNewFixed { .. } => GC + 8,
        Operator::ArrayNewData { .. } => GC + 9,
        Operator::ArrayNewElem { .. } => GC + 10,
        Operator::ArrayGet { .. } => GC + 11,
        Operator::ArrayGetS { .. } => GC + 12,
        Operator::ArrayGetU { .. } => GC + 13,
        Operator::ArraySet { .. } => GC + 14,
        Operator::ArrayLen => GC + 15,
        Operator::ArrayFill { .. } => GC + 16,
        Operator::ArrayCopy { .. } => GC + 17,
        Operator::ArrayInitData { .. } => GC + 18,
        Operator::ArrayInitElem { .. } => GC + 19,
        Operator::RefTestNonNull { .. } => GC + 20,
        Operator::RefTestNullable { .. } => GC + 21,
        Operator::RefCastNonNull { .. } => GC + 22,
        Operator::RefCastNullable { .. } => GC + 23,
        Operator::BrOnCast { .. } => GC + 24,
        Operator::BrOnCastFail { .. } => GC + 25,
        Operator::AnyConvertExtern => GC + 26,
        Operator::ExternConvertAny => GC + 27,
        Operator::RefI31 => GC + 28,
        Operator::I31GetS => GC + 29,
        Operator::I31GetU => GC + 30,

        Operator::I32TruncSatF32S => MISC,
        Operator::I32TruncSatF32U => MISC + 1,
        Operator::I32TruncSatF64S => MISC + 2,
        Operator::I32TruncSatF64U => MISC + 3,
        Operator::I64TruncSatF32S => MISC + 4,
        Operator::I64TruncSatF32U => MISC + 5,
        Operator::I64TruncSatF64S => MISC + 6,
        Operator::I64TruncSatF64U => MISC + 7,
        Operator::MemoryInit { .. } => MISC + 8,
        Operator::DataDrop { .. } => MISC + 9,
        Operator::MemoryCopy { .. } => MISC + 10,
        Operator::MemoryFill { .. } => MISC + 11,
        Operator::TableInit { .. } => MISC + 12,
        Operator::ElemDrop { .. } => MISC + 13,
        Operator::TableCopy { .. } => MISC + 14,
        Operator::TableGrow { .. } => MISC + 15,
        Operator::TableSize { .. } => MISC + 16,
        Operator::TableFill { .. } => MISC + 17,

        Operator::V128Load { .. } => SIMD,
        Operator::V128Load8x8S { .. } => SIMD + 1,
        Operator::V128Load8x8U { .. } => SIMD + 2,
        Operator::V128Load16x4S { .. } => SIMD + 3,
        Operator::V128Load16x4U { .. } => SIMD + 4,
        Operator::V128Load32x2S { .. } => SIMD + 5,
        Operator::V128Load32x2U { .. } => SIMD + 6,
        Operator::V128Load8Splat { .. } => SIMD + 7,
        Operator::V128Load16Splat { .. } => SIMD + 8,
        Operator::V128Load32Splat { .. } => SIMD + 9,
        Operator::V128Load64Splat { .. } => SIMD + 10,
        Operator::V128Store { .. } => SIMD + 11,
        Operator::V128Const { .. } => SIMD + 12,
        Operator::I8x16Shuffle { .. } => SIMD + 13,
        Operator::I8x16Swizzle => SIMD + 14,
        Operator::I8x16Splat => SIMD + 15,
        Operator::I16x8Splat => SIMD + 16,
        Operator::I32x4Splat => SIMD + 17,
        Operator::I64x2Splat => SIMD + 18,
        Operator::F32x4Splat => SIMD + 19,
        Operator::F64x2Splat => SIMD + 20,
        Operator::I8x16ExtractLaneS { .. } => SIMD + 21,
        Operator::I8x16ExtractLaneU { .. } => SIMD + 22,
        Operator::I8x16ReplaceLane { .. } => SIMD + 23,
        Operator::I16x8ExtractLaneS { .. } => SIMD + 24,
        Operator::I16x8ExtractLaneU { .. } => SIMD + 25,
        Operator::I16x8ReplaceLane { .. } => SIMD + 26,
        Operator::I32x4ExtractLane { .. } => SIMD + 27,
        Operator::I32x4ReplaceLane { .. } => SIMD + 28,
        Operator::I64x2ExtractLane { .. } => SIMD + 29,
        Operator::I64x2ReplaceLane { .. } => SIMD + 30,
        Operator::F32x4ExtractLane { .. } => SIMD + 31,
        Operator::F32x4ReplaceLane { .. } => SIMD + 32,
        Operator::F64x2ExtractLane { .. } => SIMD + 33,
        Operator::F64x2ReplaceLane { .. } => SIMD + 34,
        Operator::I8x16Eq => SIMD + 35,
        Operator::I8x16Ne => SIMD + 36,
        Operator::I8x16LtS => SIMD + 37,
        Operator::I8x16LtU => SIMD + 38,
        Operator::I8x16GtS => SIMD + 39,
        Operator::I8x16GtU => SIMD + 40,
        Operator::I8x16LeS => SIMD + 41,
        Operator::I8x16LeU => SIMD + 42,
        Operator::I8x16GeS => SIMD + 43,
        Operator::I8x16GeU => SIMD + 44,
        Operator::I16x8Eq => SIMD + 45,
        Operator::I16x8Ne => SIMD + 46,
        Operator::I16x8LtS => SIMD + 47,
        Operator::I16x8LtU => SIMD + 48,
        Operator::I16x8GtS => SIMD + 49,
        Operator::I16x8GtU => SIMD + 50,
        Operator::I16x8LeS => SIMD + 51,
        Operator::I16x8LeU => SIMD + 52,
        Operator::I16x8GeS => SIMD + 53,
        Operator::I16x8GeU => SIMD + 54,
        Operator::I32x4Eq => SIMD + 55,
        Operator::I32x4Ne => SIMD + 56,
        Operator::I32x4LtS => SIMD + 57,
        Operator::I32x4LtU => SIMD + 58,
        Operator::I32x4GtS => SIMD + 59,
        Operator::I32x4GtU => SIMD + 60,
        Operator::I32x4LeS => SIMD + 61,
        Operator::I32x4LeU => SIMD + 62,
        Operator::I32x4GeS => SIMD + 63,
        Operator::I32x4GeU => SIMD + 64,
        Operator::F32x4Eq => SIMD + 65,
        Operator::F32x4Ne => SIMD + 66,
        Operator::F32x4Lt => SIMD + 67,
        Operator::F32x4Gt => SIMD + 68,
        Operator::F32x4Le => SIMD + 69,
        Operator::F32x4Ge => SIMD + 70,
        Operator::F64x2Eq => SIMD + 71,
        Operator::F64x2Ne => SIMD + 72,
        Operator::F64x2Lt => SIMD + 73,
        Operator::F64x2Gt => SIMD + 74,
        Operator::F64x2Le => SIMD + 75,
        Operator::F64x2Ge => SIMD + 76,
        Operator::V128Not => SIMD + 77,
        Operator::V128And => SIMD + 78,
        Operator::V128AndNot => SIMD + 79,
        Operator::V128Or => SIMD + 80,
        Operator::V128Xor => SIMD + 81,
        Operator::V128Bitselect => SIMD + 82,
        Operator::V128AnyTrue => SIMD + 83,
        Operator::V128Load8Lane { .. } => SIMD + 84,
        Operator::V128Load16Lane { .. } => SIMD + 85,
        Operator::V128Load32Lane { .. } => SIMD + 86,
        Operator::V128Load64Lane { .. } => SIMD + 87,
        Operator::V128Store8Lane { .. } => SIMD + 88,
        Operator::V128Store16Lane { .. } => SIMD + 89,
        Operator::V128Store32Lane { .. } => SIMD + 90,
        Operator::V128Store64Lane { .. } => SIMD + 91,
        Operator::V128Load32Zero { .. } => SIMD + 92,
        Operator::V128Load64Zero { .. } => SIMD + 93,
        Operator::F32x4DemoteF64x2Zero => SIMD + 94,
        Operator::F64x2PromoteLowF32x4 => SIMD + 95,
        Operator::I8x16Abs => SIMD + 96,
        Operator::I8x16Neg => SIMD + 97,
        Operator::I8x16Popcnt => SIMD + 98,
        Operator::I8x16AllTrue => SIMD + 99,
        Operator::I8x16Bitmask => SIMD + 100,
        Operator::I8x16NarrowI16x8S => SIMD + 101,
        Operator::I8x16NarrowI16x8U => SIMD + 102,
        Operator::F32x4Ceil => SIMD + 103,
        Operator::F32x4Floor => SIMD + 104,
        Operator::F32x4Trunc => SIMD + 105,
        Operator::F32x4Nearest => SIMD + 106,
        Operator::I8x16Shl => SIMD + 107,
        Operator::I8x16ShrS => SIMD + 108,
        Operator::I8x16ShrU => SIMD + 109,
        Operator::I8x16Add => SIMD + 110,
        Operator::I8x16AddSatS => SIMD + 111,
        Operator::I8x16AddSatU => SIMD + 112,
        Operator::I8x16Sub => SIMD + 113,
        Operator::I8x16SubSatS => SIMD + 114,
        Operator::I8x16SubSatU => SIMD + 115,
        Operator::F64x2Ceil => SIMD + 116,
        Operator::F64x2Floor => SIMD + 117,
        Operator::I8x16MinS => SIMD + 118,
        Operator::I8x16MinU => SIMD + 119,
        Operator::I8x16MaxS => SIMD + 120,
        Operator::I8x16MaxU => SIMD + 121,
        Operator::F64x2Trunc => SIMD + 122,
        Operator::I8x16AvgrU => SIMD + 123,
        Operator::I16x8ExtAddPairwiseI8x16S => SIMD + 124,
        Operator::I16x8ExtAddPairwiseI8x16U => SIMD + 125,
        Operator::I32x4ExtAddPairwiseI16x8S => SIMD + 126,
        Operator::I32x4ExtAddPairwiseI16x8U => SIMD + 127,
        Operator::I16x8Abs => SIMD + 128,
        Operator::I16x8Neg => SIMD + 129,
        Operator::I16x8Q15MulrSatS => SIMD + 130,
        Operator::I16x8AllTrue => SIMD + 131,
        Operator::I16x8Bitmask => SIMD + 132,
        Operator::I16x8NarrowI32x4S => SIMD + 133,
        Operator::I16x8NarrowI32x4U => SIMD + 134,
        Operator::I16x8ExtendLowI8x16S => SIMD + 135,
        Operator::I16x8ExtendHighI8x16S => SIMD + 136,
        Operator::I16x8ExtendLowI8x16U => SIMD + 137,
        Operator::I16x8ExtendHighI8x16U => SIMD + 138,
        Operator::I16x8Shl => SIMD + 139,
        Operator::I16x8ShrS => SIMD + 140,
        Operator::I16x8ShrU => SIMD + 141,
        Operator::I16x8Add => SIMD + 142,
        Operator::I16x8AddSatS => SIMD + 143,
        Operator::I16x8AddSatU => SIMD + 144,
        Operator::I16x8Sub => SIMD + 145,
        Operator::I16x8SubSatS => SIMD + 146,
        Operator::I16x8SubSatU => SIMD + 147,
        Operator::F64x2Nearest => SIMD + 148,
        Operator::I16x8Mul => SIMD + 149,
        Operator::I16x8MinS => SIMD + 150,
        Operator::I16x8MinU => SIMD + 151,
        Operator::I16x8MaxS => SIMD + 152,
        Operator::I16x8MaxU => SIMD + 153,
        Operator::I16x8AvgrU => SIMD + 155,
        Operator::I16x8ExtMulLowI8x16S => SIMD + 156,
        Operator::I16x8ExtMulHighI8x16S => SIMD + 157,
        Operator::I16x8ExtMulLowI8x16U => SIMD + 158,
        Operator::I16x8ExtMulHighI8x16U => SIMD + 159,
        Operator::I32x4Abs => SIMD + 160,
        Operator::I32x4Neg => SIMD + 161,
        Operator::I32x4AllTrue => SIMD + 163,
        Operator::I32x4Bitmask => SIMD + 164,
        Operator::I32x4ExtendLowI16x8S => SIMD + 167,
        Operator::I32x4ExtendHighI16x8S => SIMD + 168,
        Operator::I32x4ExtendLowI16x8U => SIMD + 169,
        Operator::I32x4ExtendHighI16x8U => SIMD + 170,
        Operator::I32x4Shl => SIMD + 171,
        Operator::I32x4ShrS => SIMD + 172,
        Operator::I32x4ShrU => SIMD + 173,
        Operator::I32x4Add => SIMD + 174,
        Operator::I32x4Sub => SIMD + 177,
        Operator::I32x4Mul => SIMD + 181,
        Operator::I32x4MinS => SIMD + 182,
        Operator::I32x4MinU => SIMD + 183,
        Operator::I32x4MaxS => SIMD + 184,
        Operator::I32x4MaxU => SIMD + 185,
        Operator::I32x4DotI16x8S => SIMD + 186,
        Operator::I32x4ExtMulLowI16x8S => SIMD + 188,
        Operator::I32x4ExtMulHighI16x8S => SIMD + 189,
        Operator::I32x4ExtMulLowI16x8U => SIMD + 190,
        Operator::I32x4ExtMulHighI16x8U => SIMD + 191,
        Operator::I64x2Abs => SIMD + 192,
        Operator::I64x2Neg => SIMD + 193,
        Operator::I64x2AllTrue => SIMD + 195,
        Operator::I64x2Bitmask => SIMD + 196,
        Operator::I64x2ExtendLowI32x4S => SIMD + 199,
        Operator::I64x2ExtendHighI32x4S => SIMD + 200,
        Operator::I64x2ExtendLowI32x4U => SIMD + 201,
        Operator::I64x2ExtendHighI32x4U => SIMD + 202,
        Operator::I64x2Shl => SIMD + 203,
        Operator::I64x2ShrS => SIMD + 204,
        Operator::I64x2ShrU => SIMD + 205,
        Operator::I64x2Add => SIMD + 206,
        Operator::I64x2Sub => SIMD + 209,
        Operator::I64x2Mul => SIMD + 213,
        Operator::I64x2Eq => SIMD + 214,
        Operator::I64x2Ne => SIMD + 215,
        Operator::I64x2LtS => SIMD + 216,
        Operator::I64x2GtS => SIMD + 217,
        Operator::I64x2LeS => SIMD + 218,
        Operator::I64x2GeS => SIMD + 219,
        Operator::I64x2ExtMulLowI32x4S => SIMD + 220,
        Operator::I64x2ExtMulHighI32x4S => SIMD + 221,
        Operator::I64x2ExtMulLowI32x4U => SIMD + 222,
        Operator::I64x2ExtMulHighI32x4U => SIMD + 223,
        Operator::F32x4Abs => SIMD + 224,
        Operator::F32x4Neg => SIMD + 225,
        Operator::F32x4Sqrt => SIMD + 227,
        Operator::F32x4Add => SIMD + 228,
        Operator::F32x4Sub => SIMD + 229,
        Operator::F32x4Mul => SIMD + 230,
        Operator::F32x4Div => SIMD + 231,
        Operator::F32x4Min => SIMD + 232,
        Operator::F32x4Max => SIMD + 233,
        Operator::F32x4PMin => SIMD + 234,
        Operator::F32x4PMax => SIMD + 235,
        Operator::F64x2Abs => SIMD + 236,
        Operator::F64x2Neg => SIMD + 237,
        Operator::F64x2Sqrt => SIMD + 239,
        Operator::F64x2Add => SIMD + 240,
        Operator::F64x2Sub => SIMD + 241,
        Operator::F64x2Mul => SIMD + 242,
        Operator::F64x2Div => SIMD + 243,
        Operator::F64x2Min => SIMD + 244,
        Operator::F64x2Max => SIMD + 245,
        Operator::F64x2PMin => SIMD + 246,
        Operator::F64x2PMax => SIMD + 247,
        Operator::I32x4TruncSatF32x4S => SIMD + 248,
        Operator::I32x4TruncSatF32x4U => SIMD + 249,
        Operator::F32x4ConvertI32x4S => SIMD + 250,
        Operator::F32x4ConvertI32x4U => SIMD + 251,
        Operator::I32x4TruncSatF64x2SZero => SIMD + 252,
        Operator::I32x4TruncSatF64x2UZero => SIMD + 253,
        Operator::F64x2ConvertLowI32x4S => SIMD + 254,
        Operator::F64x2ConvertLowI32x4U => SIMD + 255,
        Operator::I8x16RelaxedSwizzle => SIMD + 256,
        Operator::I32x4RelaxedTruncF32x4S => SIMD + 257,
        Operator::I32x4RelaxedTruncF32x4U => SIMD + 258,
        Operator::I32x4RelaxedTruncF64x2SZero => SIMD + 259,
        Operator::I32x4RelaxedTruncF64x2UZero => SIMD + 260,
        Operator::F32x4RelaxedMadd => SIMD + 261,
        Operator::F32x4RelaxedNmadd => SIMD + 262,
        Operator::F64x2RelaxedMadd => SIMD + 263,
        Operator::F64x2RelaxedNmadd => SIMD + 264,
        Operator::I8x16RelaxedLaneselect => SIMD + 265,
        Operator::I16x8RelaxedLaneselect => SIMD + 266,
        Operator::I32x4RelaxedLaneselect => SIMD + 267,
        Operator::I64x2RelaxedLaneselect => SIMD + 268,
        Operator::F32x4RelaxedMin => SIMD + 269,
        Operator::F32x4RelaxedMax => SIMD + 270,
        Operator::F64x2RelaxedMin => SIMD + 271,
        Operator::F64x2RelaxedMax => SIMD + 272,
        Operator::I16x8RelaxedQ15mulrS => SIMD + 273,
        Operator::I16x8RelaxedDotI8x16I7x16S => SIMD + 274,
        Operator::I32x4RelaxedDotI8x16I7x16AddS => SIMD + 275,

        Operator::MemoryAtomicNotify { .. } => ATOMIC,
        Operator::MemoryAtomicWait32 { .. } => ATOMIC + 1,
        Operator::MemoryAtomicWait64 { .. } => ATOMIC + 2,
        Operator::AtomicFence => ATOMIC + 3,
        Operator::I32AtomicLoad { .. } => ATOMIC + 16,
        Operator::I64AtomicLoad { .. } => ATOMIC + 17,
        Operator::I32AtomicLoad8U { .. } => ATOMIC + 18,
        Operator::I32AtomicLoad16U { .. } => ATOMIC + 19,
        Operator::I64AtomicLoad8U { .. } => ATOMIC + 20,
        Operator::I64AtomicLoad16U { .. } => ATOMIC + 21,
        Operator::I64AtomicLoad32U { .. } => ATOMIC + 22,
        Operator::I32AtomicStore { .. } => ATOMIC + 23,
        Operator::I64AtomicStore { .. } => ATOMIC + 24,
        Operator::I32AtomicStore8 { .. } => ATOMIC + 25,
        Operator::I32AtomicStore16 { .. } => ATOMIC + 26,
        Operator::I64AtomicStore8 { .. } => ATOMIC + 27,
        Operator::I64AtomicStore16 { .. } => ATOMIC + 28,
        Operator::I64AtomicStore32 { .. } => ATOMIC + 29,
        Operator::I32AtomicRmwAdd { .. } => ATOMIC + 30,
        Operator::I64AtomicRmwAdd { .. } => ATOMIC + 31,
        Operator::I32AtomicRmw8AddU { .. } => ATOMIC + 32,
        Operator::I32AtomicRmw16AddU { .. } => ATOMIC + 33,
        Operator::I64AtomicRmw8AddU { .. } => ATOMIC + 34,
        Operator::I64AtomicRmw16AddU { .. } => ATOMIC + 35,
        Operator::I64AtomicRmw32AddU { .. } => ATOMIC + 36,
        Operator::I32AtomicRmwSub { .. } => ATOMIC + 37,
        Operator::I64AtomicRmwSub { .. } => ATOMIC + 38,
        Operator::I32AtomicRmw8SubU { .. } => ATOMIC + 39,
        Operator::I32AtomicRmw16SubU { .. } => ATOMIC + 40,
        Operator::I64AtomicRmw8SubU { .. } => ATOMIC + 41,
        Operator::I64AtomicRmw16SubU { .. } => ATOMIC + 42,
        Operator::I64AtomicRmw32SubU { .. } => ATOMIC + 43,
        Operator::I32AtomicRmwAnd { .. } => ATOMIC + 44,
        Operator::I64AtomicRmwAnd { .. } => ATOMIC + 45,
        Operator::I32AtomicRmw8AndU { .. } => ATOMIC + 46,
        Operator::I32AtomicRmw16AndU { .. } => ATOMIC + 47,
        Operator::I64AtomicRmw8AndU { .. } => ATOMIC + 48,
        Operator::I64AtomicRmw16AndU { .. } => ATOMIC + 49,
        Operator::I64AtomicRmw32AndU { .. } => ATOMIC + 50,
        Operator::I32AtomicRmwOr { .. } => ATOMIC + 51,
        Operator::I64AtomicRmwOr { .. } => ATOMIC + 52,
        Operator::I32AtomicRmw8OrU { .. } => ATOMIC + 53,
        Operator::I32AtomicRmw16OrU { .. } => ATOMIC + 54,
        Operator::I64AtomicRmw8OrU { .. } => ATOMIC + 55,
        Operator::I64AtomicRmw16OrU { .. } => ATOMIC + 56,
        Operator::I64AtomicRmw32OrU { .. } => ATOMIC + 57,
        Operator::I32AtomicRmwXor { .. } => ATOMIC + 58,
        Operator::I64AtomicRmwXor { .. } => ATOMIC + 59,
        Operator::I32AtomicRmw8XorU { .. } => ATOMIC + 60,
        Operator::I32AtomicRmw16XorU { .. } => ATOMIC + 61,
        Operator::I64AtomicRmw8XorU { .. } => ATOMIC + 62,
        Operator::I64AtomicRmw16XorU { .. } => ATOMIC + 63,
        Operator::I64AtomicRmw32XorU { .. } => ATOMIC + 64,
        Operator::I32AtomicRmwXchg { .. } => ATOMIC + 65,
        Operator::I64AtomicRmwXchg { .. } => ATOMIC + 66,
        Operator::I32AtomicRmw8XchgU { .. } => ATOMIC + 67,
        Operator::I32AtomicRmw16XchgU { .. } => ATOMIC + 68,
        Operator::I64AtomicRmw8XchgU { .. } => ATOMIC + 69,
        Operator::I64AtomicRmw16XchgU { .. } => ATOMIC + 70,
        Operator::I64AtomicRmw32XchgU { .. } => ATOMIC + 71,
        Operator::I32AtomicRmwCmpxchg { .. } => ATOMIC + 72,
        Operator::I64AtomicRmwCmpxchg { .. } => ATOMIC + 73,
        Operator::I32AtomicRmw8CmpxchgU { .. } => ATOMIC + 74,
        Operator::I32AtomicRmw16CmpxchgU { .. } => ATOMIC + 75,
        Operator::I64AtomicRmw8CmpxchgU { .. } => ATOMIC + 76,
        Operator::I64AtomicRmw16CmpxchgU { .. } => ATOMIC + 77,
        Operator::I64AtomicRmw32CmpxchgU { .. } => ATOMIC + 78,

        _ => u16::MAX,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_opcodes_use_their_binary_encoding() {
        assert_eq!(cost_index(&Operator::I32Add), 0x6A);
        assert_eq!(cost_index(&Operator::Unreachable), 0x00);
        assert_eq!(cost_index(&Operator::I64Rotr), 0x8A);
    }

    #[test]
    fn prefixed_spaces_stay_disjoint() {
        let gc = cost_index(&Operator::ArrayLen);
        let misc = cost_index(&Operator::I32TruncSatF32S);
        let simd = cost_index(&Operator::I8x16Swizzle);
        let atomic = cost_index(&Operator::AtomicFence);
        assert!(simd < ATOMIC && atomic < GC && gc < MISC);
        assert!(misc >= MISC);
    }
}
