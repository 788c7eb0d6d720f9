//! End to end assembly: source text in, object code and diagnostics out.

use indoc::indoc;
use pretty_assertions::assert_eq;

use cvm::bytecode::{decode_program, disassemble, parse_assembly, ArgKind};
use cvm::{Argument, Assembler, AssemblerConfig, AssemblyError, Instruction, Opcode};

const SQUARE: &str = indoc! {"
      PROGRAM 4
      LDCINT 6
      CALL P
      HALT

  ; Squares its parameter into the program's variable.
  P:  PROC 4
      DEFINT t
      LDLADDR t
      LDLADDR -4
      LOADW
      LDLADDR -4
      LOADW
      MUL
      STOREW
      LDGADDR 0
      LDLADDR t
      LOADW
      STOREW
      RET 4
"};

#[test]
fn folds_constants() {
  let assembly = Assembler::default().assemble("LDCINT 1\nLDCINT 2\nADD\nHALT").unwrap();
  assert_eq!(
    assembly.program,
    vec![Instruction::with_int(Opcode::LdcInt, 3), Instruction::nullary(Opcode::Halt)]
  );
  assert_eq!(assembly.code, vec![16, 0, 0, 0, 3, 0]);
}

#[test]
fn multiplies_a_variable_by_shifting() {
  let source = indoc! {"
        PROGRAM 0
        CALL P
        HALT
    P:  PROC 4
        DEFINT x
        LDLADDR x
        LDCINT 5
        STOREW
        LDCINT 8
        LDLADDR x
        LOADW
        MUL
        PUTINT
        RET 0
  "};
  let expected = parse_assembly(indoc! {"
        PROGRAM 0
        CALL P
        HALT
    P:  PROC 4
        DEFINT x
        LDLADDR x
        LDCINT 5
        STOREW
        LDLADDR x
        LOADW
        SHL 3
        PUTINT
        RET 0
  "}).unwrap();

  let assembly = Assembler::default().assemble(source).unwrap();
  assert_eq!(assembly.program, expected);
  assert_eq!(assembly.ids.get_offset("x"), Some(8));
}

#[test]
fn optimization_can_be_turned_off() {
  let config = AssemblerConfig { optimize: false, ..AssemblerConfig::default() };
  let assembly = Assembler::new(config).assemble("LDCINT 1\nLDCINT 2\nADD\nHALT").unwrap();
  assert_eq!(assembly.program.len(), 4);
  assert_eq!(assembly.code.len(), 12);
}

#[test]
fn object_code_decodes_to_the_emitted_program() {
  let assembly = Assembler::default().assemble(SQUARE).unwrap();

  let expected: Vec<(usize, Instruction)> = assembly.program
    .iter()
    .filter(|instruction| !instruction.opcode.is_pseudo())
    .map(|instruction| {
      let address = instruction.address().unwrap();
      let arg = match (instruction.opcode.arg_kind(), &instruction.arg) {
        (ArgKind::Label, Some(Argument::Id(label))) => {
          Some(Argument::Int(assembly.labels.resolve(label).unwrap() - address))
        }
        (ArgKind::Offset, Some(Argument::Id(id))) => {
          Some(Argument::Int(assembly.ids.get_offset(id).unwrap()))
        }
        (_, arg) => arg.clone()
      };
      (address as usize, Instruction::new(instruction.opcode, arg))
    })
    .collect();

  assert_eq!(decode_program(&assembly.code).unwrap(), expected);
}

#[test]
fn disassembles_object_code() {
  let assembly = Assembler::default().assemble(SQUARE).unwrap();
  let listing = disassemble(&assembly.code).unwrap();
  let lines: Vec<&str> = listing.lines().collect();

  assert_eq!(lines.len(), 17);
  assert_eq!(lines[0], "   0:  PROGRAM 4");
  assert_eq!(lines[2], "  10:  CALL 6   ; -> 16");
  assert_eq!(lines[4], "  16:  PROC 4");
  assert_eq!(lines[5], "  21:  LDLADDR 8");
}

#[test]
fn string_escapes_are_decoded_before_emission() {
  let assembly = Assembler::default().assemble("LDCSTR \"a\\tb\"\nHALT").unwrap();
  assert_eq!(
    assembly.code,
    vec![17, 0, 0, 0, 3, 0, b'a', 0, b'\t', 0, b'b', 0]
  );
  assert_eq!(assembly.program[0].size(), 11);
}

#[test]
fn reports_all_constraint_errors() {
  let source = indoc! {"
        PROGRAM 4
    L1: LDCINT 1
    L1: LDCINT 2
        BZ nowhere
        LDLADDR y
        SHL 32
        LDCB 300
        LDCCH \"ab\"
        HALT
  "};
  let error = Assembler::default().assemble(source).unwrap_err();
  let errors = match &error {
    AssemblyError::Constraints(errors) => errors,
    other => panic!("expected constraint errors, got {:?}", other)
  };

  let lines: Vec<u32> = errors.iter().map(|error| error.line).collect();
  assert_eq!(lines, vec![3, 4, 5, 6, 7, 8]);
  assert!(errors[0].message.contains("L1:"));
  assert!(error.to_string().starts_with("*** Constraint error detected near line 3:"));
  assert_eq!(error.to_string().lines().count(), 12);
}

#[test]
fn reports_all_syntax_errors() {
  let source = indoc! {"
        PROGRAM
        LDCINT 1 2
        JUMP L1
        HALT
  "};
  match Assembler::default().assemble(source) {
    Err(AssemblyError::Syntax(errors)) => {
      let lines: Vec<u32> = errors.iter().map(|error| error.line).collect();
      assert_eq!(lines, vec![1, 2, 3]);
    }
    other => panic!("expected syntax errors, got {:?}", other)
  }
}

#[test]
fn assembles_a_prebuilt_program() {
  let program = vec![
    Instruction::with_int(Opcode::LdcInt, 5).labeled("L1"),
    Instruction::with_int(Opcode::LdcInt, 0),
    Instruction::with_id(Opcode::Br, "L1"),
    Instruction::nullary(Opcode::Halt),
  ];
  let assembly = Assembler::default().assemble_program(program).unwrap();
  assert_eq!(
    assembly.program,
    vec![
      Instruction::with_int(Opcode::LdcInt, 5).labeled("L1"),
      Instruction::nullary(Opcode::LdcInt0),
      Instruction::with_id(Opcode::Br, "L1"),
    ]
  );
  assert_eq!(assembly.code, vec![16, 0, 0, 0, 5, 22, 41, 0xFF, 0xFF, 0xFF, 0xFA]);
}

#[test]
fn declarations_after_a_return_stay_declared() {
  let source = indoc! {"
        PROGRAM 0
        CALL P
        HALT
    P:  PROC 4
        RET 0
        DEFINT t
        LDCINT 1
    Q:  PROC 4
        LDLADDR t
        LOADW
        PUTINT
        RET 0
  "};
  let assembly = Assembler::default().assemble(source).unwrap();
  assert_eq!(assembly.ids.get_offset("t"), Some(8));
  assert!(assembly.program.iter().all(|instruction| instruction.opcode != Opcode::LdcInt1));
}
