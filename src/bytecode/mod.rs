/*!

  The machine uses a 64 bit instruction word, most significant byte first. Every
  instruction is exactly one word. The sizes of instruction components are as
  follows:

    Opcode:     8 bits
    Register:   8 bits (three fields, r0 r1 r2)
    Immediate: 32 bits

  A program image on disk is the same words serialized little-endian, which is
  the loader's concern. Register index fields are reused contextually: each
  opcode has an `OperandFormat` naming the fields it consumes, and the fields it
  does not consume are ignored by decoding and zeroed by encoding.

  One design decision that needed to be made is whether decoded instructions
  should mirror the word layout (a struct of five raw fields) or the operation
  set (one enum variant per operation). The variant form wins: a decoded
  instruction lives for one cycle, so the size of the enum is irrelevant, and an
  exhaustive match over operations keeps the unrecognized-opcode rule a visible
  branch instead of a fallthrough.

*/

mod assembly;
mod binary;
mod instruction;

pub use assembly::{assemble, AssemblyError};
pub use binary::{decode_instruction, encode_instruction, InstructionWord, WORD_BYTES};
pub use instruction::{Instruction, Opcode, OperandFormat, RegisterIndex};
