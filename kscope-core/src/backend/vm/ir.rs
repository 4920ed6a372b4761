use std::{collections::HashMap, fmt::Display};

use crate::backend::{ArithOp, CompareOp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FunctionId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockId {
    pub function: FunctionId,
    pub index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotId {
    pub function: FunctionId,
    pub index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Register(pub u32);

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Operand {
    Number(f64),
    Register(Register),
    Param(usize),
}

impl Display for Operand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(value) => write!(f, "{value:?}"),
            Self::Register(Register(index)) => write!(f, "%{index}"),
            Self::Param(index) => write!(f, "${index}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    Arith {
        dest: Register,
        op: ArithOp,
        lhs: Operand,
        rhs: Operand,
    },
    Compare {
        dest: Register,
        op: CompareOp,
        lhs: Operand,
        rhs: Operand,
    },
    Truth {
        dest: Register,
        value: Operand,
    },
    Load {
        dest: Register,
        slot: usize,
    },
    Store {
        slot: usize,
        value: Operand,
    },
    Call {
        dest: Register,
        callee: FunctionId,
        arguments: Vec<Operand>,
    },
    // (value, predecessor block)
    Phi {
        dest: Register,
        incoming: Vec<(Operand, usize)>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Terminator {
    Branch(usize),
    CondBranch {
        condition: Operand,
        then: usize,
        otherwise: usize,
    },
    Return(Operand),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub name: String,
    pub instructions: Vec<Instruction>,
    pub terminator: Option<Terminator>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    pub parameters: Vec<String>,
    pub blocks: Vec<Block>,
    pub slots: Vec<String>,
    pub registers: u32,
}

impl Function {
    pub fn has_body(&self) -> bool {
        !self.blocks.is_empty()
    }

    pub fn clear_body(&mut self) {
        self.blocks.clear();
        self.slots.clear();
        self.registers = 0;
    }

    fn label(&self, index: usize) -> String {
        match self.blocks.get(index) {
            Some(block) => format!("{}.{index}", block.name),
            None => format!("?.{index}"),
        }
    }
}

/// One compilation unit of the virtual machine.
#[derive(Debug, Clone, PartialEq)]
pub struct Unit {
    pub name: String,
    pub functions: Vec<Function>,

    names: HashMap<String, FunctionId>,
}

impl Unit {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            functions: vec![],
            names: HashMap::new(),
        }
    }

    pub fn declare(&mut self, name: &str, parameters: &[String]) -> FunctionId {
        let id = FunctionId(self.functions.len());

        self.functions.push(Function {
            name: name.to_string(),
            parameters: parameters.to_vec(),
            blocks: vec![],
            slots: vec![],
            registers: 0,
        });
        self.names.insert(name.to_string(), id);

        id
    }

    /// Unmaps a bodyless function unless some body still calls it.
    pub fn forget(&mut self, id: FunctionId) -> bool {
        let Some(function) = self.function(id) else {
            return false;
        };

        if function.has_body() || self.lookup(&function.name) != Some(id) {
            return false;
        }

        let called = self.functions.iter()
            .flat_map(|function| &function.blocks)
            .flat_map(|block| &block.instructions)
            .any(|instruction| matches!(instruction, Instruction::Call { callee, .. } if *callee == id));

        if called {
            return false;
        }

        let name = function.name.clone();
        self.names.remove(&name);

        true
    }

    pub fn lookup(&self, name: &str) -> Option<FunctionId> {
        self.names.get(name).copied()
    }

    pub fn function(&self, id: FunctionId) -> Option<&Function> {
        self.functions.get(id.0)
    }

    pub fn function_mut(&mut self, id: FunctionId) -> Option<&mut Function> {
        self.functions.get_mut(id.0)
    }

    fn callee_name(&self, id: FunctionId) -> &str {
        self.function(id).map_or("?", |function| function.name.as_str())
    }

    fn write_instruction(
        &self,
        f: &mut std::fmt::Formatter<'_>,
        function: &Function,
        instruction: &Instruction
    ) -> std::fmt::Result {
        match instruction {
            Instruction::Arith { dest, op, lhs, rhs } => {
                let op = match op {
                    ArithOp::Add => "add",
                    ArithOp::Subtract => "sub",
                    ArithOp::Multiply => "mul",
                };

                writeln!(f, "  %{} = {op} {lhs}, {rhs}", dest.0)
            },
            Instruction::Compare { dest, op, lhs, rhs } => {
                let op = match op {
                    CompareOp::LessThan => "lt",
                    CompareOp::Equal => "eq",
                };

                writeln!(f, "  %{} = {op} {lhs}, {rhs}", dest.0)
            },
            Instruction::Truth { dest, value } => writeln!(f, "  %{} = test {value}", dest.0),
            Instruction::Load { dest, slot } => writeln!(f, "  %{} = load s{slot}", dest.0),
            Instruction::Store { slot, value } => writeln!(f, "  store {value}, s{slot}"),
            Instruction::Call { dest, callee, arguments } => {
                let arguments = arguments.iter()
                    .map(|argument| argument.to_string())
                    .collect::<Vec<String>>();

                writeln!(f, "  %{} = call {}({})", dest.0, self.callee_name(*callee), arguments.join(", "))
            },
            Instruction::Phi { dest, incoming } => {
                let incoming = incoming.iter()
                    .map(|(value, block)| format!("[{value}, {}]", function.label(*block)))
                    .collect::<Vec<String>>();

                writeln!(f, "  %{} = phi {}", dest.0, incoming.join(", "))
            },
        }
    }
}

impl Display for Unit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "; unit {}", self.name)?;

        for (index, function) in self.functions.iter().enumerate() {
            // forgotten declarations
            if self.lookup(&function.name) != Some(FunctionId(index)) {
                continue;
            }

            let parameters = function.parameters.join(" ");

            if !function.has_body() {
                writeln!(f, "\ndeclare {}({})", function.name, parameters)?;
                continue;
            }

            writeln!(f, "\ndefine {}({}) {{", function.name, parameters)?;

            for (index, slot) in function.slots.iter().enumerate() {
                writeln!(f, "  s{index} = slot {slot}")?;
            }

            for (index, block) in function.blocks.iter().enumerate() {
                writeln!(f, "{}:", function.label(index))?;

                for instruction in &block.instructions {
                    self.write_instruction(f, function, instruction)?;
                }

                match &block.terminator {
                    Some(Terminator::Branch(target)) => writeln!(f, "  br {}", function.label(*target))?,
                    Some(Terminator::CondBranch { condition, then, otherwise }) => writeln!(
                        f,
                        "  br {condition}, {}, {}",
                        function.label(*then),
                        function.label(*otherwise)
                    )?,
                    Some(Terminator::Return(value)) => writeln!(f, "  ret {value}")?,
                    None => writeln!(f, "  ; unterminated")?,
                }
            }

            writeln!(f, "}}")?;
        }

        Ok(())
    }
}
