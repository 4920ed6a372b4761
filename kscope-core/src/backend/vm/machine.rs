use std::{collections::HashMap, rc::Rc};

use crate::{backend::{ArithOp, Backend, BackendError, CompareOp}, host};
use super::ir::{Block, BlockId, Function, FunctionId, Instruction, Operand, Register, SlotId, Terminator, Unit};

/// Frames allowed on the interpreter stack before a call is refused.
///
/// Frames live on the heap, the limit only stops runaway recursion.
pub const MAX_CALL_DEPTH: usize = 1 << 18;

pub type HostFunction = Rc<dyn Fn(&[f64]) -> f64>;

#[derive(Clone)]
struct HostBinding {
    arity: usize,
    function: HostFunction,
}

/// Reference backend: builds [`Unit`]s and interprets them.
pub struct VirtualMachine {
    unit: Option<Unit>,
    cursor: Option<BlockId>,
    host: HashMap<String, HostBinding>,
    max_call_depth: usize,
}

impl Default for VirtualMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualMachine {
    /// A machine with the `putchard` and `printd` primitives bound.
    pub fn new() -> Self {
        let mut vm = Self::without_host();

        for (name, primitive) in host::PRIMITIVES {
            vm.bind_host(name, 1, move |arguments| primitive(arguments[0]));
        }

        vm
    }

    pub fn without_host() -> Self {
        Self {
            unit: None,
            cursor: None,
            host: HashMap::new(),
            max_call_depth: MAX_CALL_DEPTH,
        }
    }

    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    /// Makes `name` callable from programs declaring `extern name(...)`.
    ///
    /// `function` always receives exactly `arity` arguments.
    pub fn bind_host(&mut self, name: &str, arity: usize, function: impl Fn(&[f64]) -> f64 + 'static) {
        self.host.insert(name.to_string(), HostBinding {
            arity,
            function: Rc::new(function),
        });
    }

    pub fn unit(&self) -> Option<&Unit> {
        self.unit.as_ref()
    }

    fn unit_ref(&self) -> Result<&Unit, BackendError> {
        self.unit.as_ref().ok_or(BackendError::NoUnit)
    }

    fn unit_mut(&mut self) -> Result<&mut Unit, BackendError> {
        self.unit.as_mut().ok_or(BackendError::NoUnit)
    }

    fn function_mut(&mut self, id: FunctionId) -> Result<&mut Function, BackendError> {
        self.unit_mut()?
            .function_mut(id)
            .ok_or(BackendError::InvalidHandle { what: "function" })
    }

    fn cursor_block(&mut self) -> Result<(&mut Function, usize), BackendError> {
        let cursor = self.cursor.ok_or(BackendError::NoInsertionPoint)?;
        let function = self.function_mut(cursor.function)?;

        if cursor.index >= function.blocks.len() {
            return Err(BackendError::InvalidHandle { what: "block" });
        }

        Ok((function, cursor.index))
    }

    fn emit(&mut self, make: impl FnOnce(Register) -> Instruction) -> Result<Operand, BackendError> {
        let (function, block) = self.cursor_block()?;

        let dest = Register(function.registers);
        function.registers += 1;
        function.blocks[block].instructions.push(make(dest));

        Ok(Operand::Register(dest))
    }

    fn emit_effect(&mut self, instruction: Instruction) -> Result<(), BackendError> {
        let (function, block) = self.cursor_block()?;
        function.blocks[block].instructions.push(instruction);

        Ok(())
    }

    fn terminate(&mut self, terminator: Terminator) -> Result<(), BackendError> {
        let (function, block) = self.cursor_block()?;
        function.blocks[block].terminator = Some(terminator);

        Ok(())
    }
}

impl Backend for VirtualMachine {
    type Function = FunctionId;
    type Block = BlockId;
    type Value = Operand;
    type Slot = SlotId;

    fn begin_unit(&mut self, name: &str) -> Result<(), BackendError> {
        self.unit = Some(Unit::new(name));
        self.cursor = None;

        Ok(())
    }

    fn dispose_unit(&mut self) {
        self.unit = None;
        self.cursor = None;
    }

    fn declare_function(&mut self, name: &str, parameters: &[String]) -> Result<FunctionId, BackendError> {
        Ok(self.unit_mut()?.declare(name, parameters))
    }

    fn get_function(&self, name: &str) -> Option<FunctionId> {
        self.unit.as_ref()?.lookup(name)
    }

    fn has_body(&self, function: FunctionId) -> bool {
        self.unit.as_ref()
            .and_then(|unit| unit.function(function))
            .is_some_and(Function::has_body)
    }

    fn parameter_count(&self, function: FunctionId) -> usize {
        self.unit.as_ref()
            .and_then(|unit| unit.function(function))
            .map_or(0, |function| function.parameters.len())
    }

    fn parameter(&self, function: FunctionId, index: usize) -> Result<Operand, BackendError> {
        let data = self.unit_ref()?
            .function(function)
            .ok_or(BackendError::InvalidHandle { what: "function" })?;

        if index >= data.parameters.len() {
            return Err(BackendError::MissingParameter { name: data.name.clone(), index });
        }

        Ok(Operand::Param(index))
    }

    fn discard_body(&mut self, function: FunctionId) {
        if let Some(data) = self.unit.as_mut().and_then(|unit| unit.function_mut(function)) {
            data.clear_body();
        }

        if self.cursor.is_some_and(|cursor| cursor.function == function) {
            self.cursor = None;
        }
    }

    fn forget_function(&mut self, function: FunctionId) -> bool {
        self.unit.as_mut().is_some_and(|unit| unit.forget(function))
    }

    fn append_block(&mut self, function: FunctionId, name: &str) -> Result<BlockId, BackendError> {
        let data = self.function_mut(function)?;

        data.blocks.push(Block {
            name: name.to_string(),
            instructions: vec![],
            terminator: None,
        });

        Ok(BlockId { function, index: data.blocks.len() - 1 })
    }

    fn position_at_end(&mut self, block: BlockId) {
        self.cursor = Some(block);
    }

    fn insert_block(&self) -> Option<BlockId> {
        self.cursor
    }

    fn current_function(&self) -> Option<FunctionId> {
        self.cursor.map(|cursor| cursor.function)
    }

    fn const_number(&mut self, value: f64) -> Operand {
        Operand::Number(value)
    }

    fn build_arith(&mut self, op: ArithOp, lhs: Operand, rhs: Operand) -> Result<Operand, BackendError> {
        self.emit(|dest| Instruction::Arith { dest, op, lhs, rhs })
    }

    fn build_compare(&mut self, op: CompareOp, lhs: Operand, rhs: Operand) -> Result<Operand, BackendError> {
        self.emit(|dest| Instruction::Compare { dest, op, lhs, rhs })
    }

    fn build_truth_test(&mut self, value: Operand) -> Result<Operand, BackendError> {
        self.emit(|dest| Instruction::Truth { dest, value })
    }

    fn build_slot(&mut self, function: FunctionId, name: &str) -> Result<SlotId, BackendError> {
        let data = self.function_mut(function)?;
        data.slots.push(name.to_string());

        Ok(SlotId { function, index: data.slots.len() - 1 })
    }

    fn build_load(&mut self, slot: SlotId, _name: &str) -> Result<Operand, BackendError> {
        self.emit(|dest| Instruction::Load { dest, slot: slot.index })
    }

    fn build_store(&mut self, slot: SlotId, value: Operand) -> Result<(), BackendError> {
        self.emit_effect(Instruction::Store { slot: slot.index, value })
    }

    fn build_branch(&mut self, target: BlockId) -> Result<(), BackendError> {
        self.terminate(Terminator::Branch(target.index))
    }

    fn build_conditional_branch(
        &mut self,
        condition: Operand,
        then: BlockId,
        otherwise: BlockId
    ) -> Result<(), BackendError> {
        self.terminate(Terminator::CondBranch {
            condition,
            then: then.index,
            otherwise: otherwise.index,
        })
    }

    fn build_phi(&mut self, incoming: &[(Operand, BlockId)], _name: &str) -> Result<Operand, BackendError> {
        let incoming = incoming.iter()
            .map(|(value, block)| (*value, block.index))
            .collect();

        self.emit(|dest| Instruction::Phi { dest, incoming })
    }

    fn build_call(&mut self, function: FunctionId, arguments: &[Operand], _name: &str) -> Result<Operand, BackendError> {
        let arguments = arguments.to_vec();

        self.emit(|dest| Instruction::Call { dest, callee: function, arguments })
    }

    fn build_return(&mut self, value: Operand) -> Result<(), BackendError> {
        self.terminate(Terminator::Return(value))
    }

    fn finish_unit(&mut self) -> Result<(), BackendError> {
        let unit = self.unit_ref()?;

        for function in &unit.functions {
            if let Some(block) = function.blocks.iter().find(|block| block.terminator.is_none()) {
                return Err(BackendError::UnterminatedBlock {
                    function: function.name.clone(),
                    block: block.name.clone(),
                });
            }
        }

        Ok(())
    }

    fn execute(&mut self, function: FunctionId) -> Result<f64, BackendError> {
        let unit = self.unit_ref()?;

        run(unit, &self.host, self.max_call_depth, function)
    }

    fn dump(&self) -> String {
        self.unit.as_ref()
            .map(|unit| unit.to_string())
            .unwrap_or_default()
    }
}

struct Frame {
    function: FunctionId,
    block: usize,
    previous: Option<usize>,
    position: usize,
    registers: Vec<f64>,
    slots: Vec<f64>,
    arguments: Vec<f64>,
    // register of the caller receiving the result
    result: Option<Register>,
}

impl Frame {
    fn enter(id: FunctionId, function: &Function, arguments: Vec<f64>, result: Option<Register>) -> Self {
        Self {
            function: id,
            block: 0,
            previous: None,
            position: 0,
            registers: vec![0.0; function.registers as usize],
            slots: vec![0.0; function.slots.len()],
            arguments,
            result,
        }
    }

    fn read(&self, operand: Operand) -> f64 {
        match operand {
            Operand::Number(value) => value,
            Operand::Register(Register(index)) => self.registers.get(index as usize).copied().unwrap_or_default(),
            Operand::Param(index) => self.arguments.get(index).copied().unwrap_or_default(),
        }
    }

    fn write(&mut self, register: Register, value: f64) {
        if let Some(target) = self.registers.get_mut(register.0 as usize) {
            *target = value;
        }
    }

    fn jump(&mut self, block: usize) {
        self.previous = Some(self.block);
        self.block = block;
        self.position = 0;
    }

    /// Everything but calls, which need the whole stack.
    fn execute(&mut self, instruction: &Instruction) -> Result<(), BackendError> {
        match instruction {
            Instruction::Arith { dest, op, lhs, rhs } => {
                let (lhs, rhs) = (self.read(*lhs), self.read(*rhs));

                let value = match op {
                    ArithOp::Add => lhs + rhs,
                    ArithOp::Subtract => lhs - rhs,
                    ArithOp::Multiply => lhs * rhs,
                };

                self.write(*dest, value);
            },
            Instruction::Compare { dest, op, lhs, rhs } => {
                let (lhs, rhs) = (self.read(*lhs), self.read(*rhs));

                let holds = match op {
                    CompareOp::LessThan => lhs < rhs,
                    CompareOp::Equal => lhs == rhs,
                };

                self.write(*dest, if holds { 1.0 } else { 0.0 });
            },
            Instruction::Truth { dest, value } => {
                let value = self.read(*value);
                // NaN is false, like an ordered comparison
                let holds = value != 0.0 && !value.is_nan();

                self.write(*dest, if holds { 1.0 } else { 0.0 });
            },
            Instruction::Load { dest, slot } => {
                let value = self.slots.get(*slot).copied()
                    .ok_or(BackendError::InvalidHandle { what: "slot" })?;

                self.write(*dest, value);
            },
            Instruction::Store { slot, value } => {
                let value = self.read(*value);
                let target = self.slots.get_mut(*slot)
                    .ok_or(BackendError::InvalidHandle { what: "slot" })?;

                *target = value;
            },
            Instruction::Phi { dest, incoming } => {
                let value = incoming.iter()
                    .find(|(_, block)| Some(*block) == self.previous)
                    .map(|(value, _)| self.read(*value))
                    .ok_or(BackendError::InvalidHandle { what: "phi predecessor" })?;

                self.write(*dest, value);
            },
            Instruction::Call { .. } => unreachable!("calls are dispatched by the interpreter loop"),
        }

        Ok(())
    }
}

fn run(
    unit: &Unit,
    host: &HashMap<String, HostBinding>,
    limit: usize,
    entry: FunctionId
) -> Result<f64, BackendError> {
    let function = unit.function(entry).ok_or(BackendError::InvalidHandle { what: "function" })?;

    if !function.parameters.is_empty() {
        return Err(BackendError::MissingParameter { name: function.name.clone(), index: 0 });
    }

    if !function.has_body() {
        return call_host(host, function, &[]);
    }

    let mut stack = vec![Frame::enter(entry, function, vec![], None)];

    loop {
        let Some(frame) = stack.last_mut() else {
            return Err(BackendError::InvalidHandle { what: "frame" });
        };

        let function = unit.function(frame.function).ok_or(BackendError::InvalidHandle { what: "function" })?;
        let block = function.blocks.get(frame.block).ok_or(BackendError::InvalidHandle { what: "block" })?;

        if let Some(instruction) = block.instructions.get(frame.position) {
            frame.position += 1;

            match instruction {
                Instruction::Call { dest, callee, arguments } => {
                    let arguments = arguments.iter()
                        .map(|argument| frame.read(*argument))
                        .collect::<Vec<f64>>();

                    let target = unit.function(*callee).ok_or(BackendError::InvalidHandle { what: "function" })?;

                    if target.has_body() {
                        if stack.len() >= limit {
                            return Err(BackendError::CallDepthExceeded { limit });
                        }

                        stack.push(Frame::enter(*callee, target, arguments, Some(*dest)));
                    } else {
                        let value = call_host(host, target, &arguments)?;
                        frame.write(*dest, value);
                    }
                },
                other => frame.execute(other)?,
            }

            continue;
        }

        match &block.terminator {
            Some(Terminator::Branch(target)) => frame.jump(*target),
            Some(Terminator::CondBranch { condition, then, otherwise }) => {
                let target = if frame.read(*condition) != 0.0 { *then } else { *otherwise };
                frame.jump(target);
            },
            Some(Terminator::Return(value)) => {
                let value = frame.read(*value);
                let result = frame.result;

                stack.pop();

                match stack.last_mut() {
                    Some(caller) => {
                        if let Some(dest) = result {
                            caller.write(dest, value);
                        }
                    },
                    None => return Ok(value),
                }
            },
            None => return Err(BackendError::UnterminatedBlock {
                function: function.name.clone(),
                block: block.name.clone(),
            }),
        }
    }
}

fn call_host(
    host: &HashMap<String, HostBinding>,
    function: &Function,
    arguments: &[f64]
) -> Result<f64, BackendError> {
    match host.get(&function.name) {
        Some(binding) if binding.arity == arguments.len() => Ok((binding.function)(arguments)),
        _ => Err(BackendError::UnresolvedSymbol { name: function.name.clone() }),
    }
}
