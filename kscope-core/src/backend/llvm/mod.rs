use std::ffi::CString;

use inkwell::{
    basic_block::BasicBlock,
    builder::{Builder, BuilderError},
    context::Context,
    execution_engine::{ExecutionEngine, JitFunction},
    module::Module,
    passes::PassBuilderOptions,
    targets::{CodeModel, InitializationConfig, RelocMode, Target, TargetMachine},
    types::BasicMetadataTypeEnum,
    values::{AsValueRef, BasicMetadataValueEnum, BasicValue, BasicValueEnum, FloatValue, FunctionValue, IntValue, PointerValue},
    FloatPredicate, OptimizationLevel,
};
use llvm_sys::{core, prelude::LLVMValueRef, support, LLVMTypeKind};

use crate::{backend::{ArithOp, Backend, BackendError, CompareOp}, host};

/// Passes run over every finished unit.
pub const PASSES: &str = "mem2reg,instcombine,reassociate,gvn,simplifycfg";

type EntryPoint = unsafe extern "C" fn() -> f64;

impl From<BuilderError> for BackendError {
    fn from(err: BuilderError) -> Self {
        match err {
            BuilderError::UnsetPosition => BackendError::NoInsertionPoint,
            other => BackendError::Llvm { message: other.to_string() },
        }
    }
}

struct LlvmUnit<'ctx> {
    engine: Option<ExecutionEngine<'ctx>>,
    module: Module<'ctx>,
    // declarations nothing can be linked against
    unresolved: Vec<String>,
}

/// JIT backend: every unit becomes an LLVM module run by MCJIT.
pub struct LlvmBackend<'ctx> {
    context: &'ctx Context,
    builder: Builder<'ctx>,
    machine: TargetMachine,
    optimize: bool,
    unit: Option<LlvmUnit<'ctx>>,
}

impl<'ctx> LlvmBackend<'ctx> {
    pub fn new(context: &'ctx Context) -> Result<Self, BackendError> {
        Target::initialize_native(&InitializationConfig::default())
            .map_err(|message| BackendError::Llvm { message })?;
        ExecutionEngine::link_in_mc_jit();

        // symbols of the running process become visible to the JIT
        unsafe { support::LLVMLoadLibraryPermanently(std::ptr::null()) };

        let triple = TargetMachine::get_default_triple();
        let target = Target::from_triple(&triple)
            .map_err(|message| BackendError::Llvm { message: message.to_string() })?;

        let machine = target.create_target_machine(
            &triple,
            "generic",
            "",
            OptimizationLevel::Default,
            RelocMode::Default,
            CodeModel::JITDefault
        ).ok_or(BackendError::Llvm { message: "unable to create a target machine".to_string() })?;

        Ok(Self {
            context,
            builder: context.create_builder(),
            machine,
            optimize: true,
            unit: None,
        })
    }

    /// Turns the pass pipeline off, listings then show the unit as lowered.
    pub fn without_passes(mut self) -> Self {
        self.optimize = false;
        self
    }

    fn module(&self) -> Result<&Module<'ctx>, BackendError> {
        self.unit.as_ref()
            .map(|unit| &unit.module)
            .ok_or(BackendError::NoUnit)
    }

    fn float(value: BasicValueEnum<'ctx>) -> Result<FloatValue<'ctx>, BackendError> {
        match value {
            BasicValueEnum::FloatValue(value) => Ok(value),
            other => Err(BackendError::Llvm { message: format!("expected a double, found {other:?}") }),
        }
    }

    fn condition(value: BasicValueEnum<'ctx>) -> Result<IntValue<'ctx>, BackendError> {
        match value {
            BasicValueEnum::IntValue(value) => Ok(value),
            other => Err(BackendError::Llvm { message: format!("expected a condition, found {other:?}") }),
        }
    }

    fn name(function: FunctionValue<'ctx>) -> String {
        function.get_name().to_string_lossy().into_owned()
    }

    fn is_external(name: &str) -> bool {
        let Ok(symbol) = CString::new(name) else {
            return false;
        };

        !unsafe { support::LLVMSearchForAddressOfSymbol(symbol.as_ptr()) }.is_null()
    }
}

/// Deletes every block of `function`, keeping it as a declaration.
///
/// # Safety
/// `function` must be a live function whose blocks aren't referenced from
/// outside of it.
unsafe fn strip_body(function: LLVMValueRef) {
    let mut instructions = vec![];
    let mut block = core::LLVMGetFirstBasicBlock(function);

    while !block.is_null() {
        let mut instruction = core::LLVMGetFirstInstruction(block);

        while !instruction.is_null() {
            instructions.push(instruction);
            instruction = core::LLVMGetNextInstruction(instruction);
        }

        block = core::LLVMGetNextBasicBlock(block);
    }

    // сначала отвязываем значения, потом удаляем
    for &instruction in &instructions {
        let ty = core::LLVMTypeOf(instruction);

        if core::LLVMGetTypeKind(ty) != LLVMTypeKind::LLVMVoidTypeKind {
            core::LLVMReplaceAllUsesWith(instruction, core::LLVMGetUndef(ty));
        }
    }

    for instruction in instructions {
        core::LLVMInstructionEraseFromParent(instruction);
    }

    loop {
        let block = core::LLVMGetFirstBasicBlock(function);

        if block.is_null() {
            break;
        }

        core::LLVMDeleteBasicBlock(block);
    }
}

impl<'ctx> Backend for LlvmBackend<'ctx> {
    type Function = FunctionValue<'ctx>;
    type Block = BasicBlock<'ctx>;
    type Value = BasicValueEnum<'ctx>;
    type Slot = PointerValue<'ctx>;

    fn begin_unit(&mut self, name: &str) -> Result<(), BackendError> {
        self.dispose_unit();

        let module = self.context.create_module(name);
        module.set_triple(&self.machine.get_triple());
        module.set_data_layout(&self.machine.get_target_data().get_data_layout());

        self.unit = Some(LlvmUnit {
            engine: None,
            module,
            unresolved: vec![],
        });

        Ok(())
    }

    fn dispose_unit(&mut self) {
        self.builder.clear_insertion_position();

        if let Some(mut unit) = self.unit.take() {
            // the engine owns the module once created
            unit.engine.take();
        }
    }

    fn declare_function(&mut self, name: &str, parameters: &[String]) -> Result<FunctionValue<'ctx>, BackendError> {
        let f64_type = self.context.f64_type();
        let parameter_types = vec![BasicMetadataTypeEnum::from(f64_type); parameters.len()];
        let fn_type = f64_type.fn_type(&parameter_types, false);

        let function = self.module()?.add_function(name, fn_type, None);

        for (parameter, name) in function.get_param_iter().zip(parameters) {
            parameter.set_name(name);
        }

        Ok(function)
    }

    fn get_function(&self, name: &str) -> Option<FunctionValue<'ctx>> {
        self.unit.as_ref()?.module.get_function(name)
    }

    fn has_body(&self, function: FunctionValue<'ctx>) -> bool {
        function.count_basic_blocks() > 0
    }

    fn parameter_count(&self, function: FunctionValue<'ctx>) -> usize {
        function.count_params() as usize
    }

    fn parameter(&self, function: FunctionValue<'ctx>, index: usize) -> Result<BasicValueEnum<'ctx>, BackendError> {
        function.get_nth_param(index as u32).ok_or_else(|| BackendError::MissingParameter {
            name: Self::name(function),
            index,
        })
    }

    fn discard_body(&mut self, function: FunctionValue<'ctx>) {
        let inside = self.builder.get_insert_block()
            .and_then(|block| block.get_parent())
            .is_some_and(|parent| parent == function);

        if inside {
            self.builder.clear_insertion_position();
        }

        unsafe { strip_body(function.as_value_ref()) };
    }

    fn forget_function(&mut self, function: FunctionValue<'ctx>) -> bool {
        let used = !unsafe { core::LLVMGetFirstUse(function.as_value_ref()) }.is_null();

        if self.has_body(function) || used {
            return false;
        }

        unsafe { function.delete() };

        true
    }

    fn append_block(&mut self, function: FunctionValue<'ctx>, name: &str) -> Result<BasicBlock<'ctx>, BackendError> {
        Ok(self.context.append_basic_block(function, name))
    }

    fn position_at_end(&mut self, block: BasicBlock<'ctx>) {
        self.builder.position_at_end(block);
    }

    fn insert_block(&self) -> Option<BasicBlock<'ctx>> {
        self.builder.get_insert_block()
    }

    fn current_function(&self) -> Option<FunctionValue<'ctx>> {
        self.builder.get_insert_block()?.get_parent()
    }

    fn const_number(&mut self, value: f64) -> BasicValueEnum<'ctx> {
        self.context.f64_type().const_float(value).into()
    }

    fn build_arith(
        &mut self,
        op: ArithOp,
        lhs: BasicValueEnum<'ctx>,
        rhs: BasicValueEnum<'ctx>
    ) -> Result<BasicValueEnum<'ctx>, BackendError> {
        let (lhs, rhs) = (Self::float(lhs)?, Self::float(rhs)?);

        let value = match op {
            ArithOp::Add => self.builder.build_float_add(lhs, rhs, "addtmp")?,
            ArithOp::Subtract => self.builder.build_float_sub(lhs, rhs, "subtmp")?,
            ArithOp::Multiply => self.builder.build_float_mul(lhs, rhs, "multmp")?,
        };

        Ok(value.into())
    }

    fn build_compare(
        &mut self,
        op: CompareOp,
        lhs: BasicValueEnum<'ctx>,
        rhs: BasicValueEnum<'ctx>
    ) -> Result<BasicValueEnum<'ctx>, BackendError> {
        let (lhs, rhs) = (Self::float(lhs)?, Self::float(rhs)?);

        let predicate = match op {
            CompareOp::LessThan => FloatPredicate::OLT,
            CompareOp::Equal => FloatPredicate::OEQ,
        };

        let flag = self.builder.build_float_compare(predicate, lhs, rhs, "cmptmp")?;
        let value = self.builder.build_unsigned_int_to_float(flag, self.context.f64_type(), "booltmp")?;

        Ok(value.into())
    }

    fn build_truth_test(&mut self, value: BasicValueEnum<'ctx>) -> Result<BasicValueEnum<'ctx>, BackendError> {
        let zero = self.context.f64_type().const_float(0.0);
        let flag = self.builder.build_float_compare(FloatPredicate::ONE, Self::float(value)?, zero, "truth")?;

        Ok(flag.into())
    }

    fn build_slot(&mut self, function: FunctionValue<'ctx>, name: &str) -> Result<PointerValue<'ctx>, BackendError> {
        let entry = function.get_first_basic_block().ok_or(BackendError::NoInsertionPoint)?;

        // slots live at the top of the entry block so mem2reg can promote them
        let builder = self.context.create_builder();

        match entry.get_first_instruction() {
            Some(instruction) => builder.position_before(&instruction),
            None => builder.position_at_end(entry),
        }

        Ok(builder.build_alloca(self.context.f64_type(), name)?)
    }

    fn build_load(&mut self, slot: PointerValue<'ctx>, name: &str) -> Result<BasicValueEnum<'ctx>, BackendError> {
        Ok(self.builder.build_load(self.context.f64_type(), slot, name)?)
    }

    fn build_store(&mut self, slot: PointerValue<'ctx>, value: BasicValueEnum<'ctx>) -> Result<(), BackendError> {
        self.builder.build_store(slot, value)?;

        Ok(())
    }

    fn build_branch(&mut self, target: BasicBlock<'ctx>) -> Result<(), BackendError> {
        self.builder.build_unconditional_branch(target)?;

        Ok(())
    }

    fn build_conditional_branch(
        &mut self,
        condition: BasicValueEnum<'ctx>,
        then: BasicBlock<'ctx>,
        otherwise: BasicBlock<'ctx>
    ) -> Result<(), BackendError> {
        self.builder.build_conditional_branch(Self::condition(condition)?, then, otherwise)?;

        Ok(())
    }

    fn build_phi(
        &mut self,
        incoming: &[(BasicValueEnum<'ctx>, BasicBlock<'ctx>)],
        name: &str
    ) -> Result<BasicValueEnum<'ctx>, BackendError> {
        let phi = self.builder.build_phi(self.context.f64_type(), name)?;

        let incoming = incoming.iter()
            .map(|(value, block)| (value as &dyn BasicValue<'ctx>, *block))
            .collect::<Vec<_>>();

        phi.add_incoming(&incoming);

        Ok(phi.as_basic_value())
    }

    fn build_call(
        &mut self,
        function: FunctionValue<'ctx>,
        arguments: &[BasicValueEnum<'ctx>],
        name: &str
    ) -> Result<BasicValueEnum<'ctx>, BackendError> {
        let arguments = arguments.iter()
            .map(|argument| BasicMetadataValueEnum::from(*argument))
            .collect::<Vec<_>>();

        self.builder.build_call(function, &arguments, name)?
            .try_as_basic_value()
            .left()
            .ok_or_else(|| BackendError::Llvm { message: format!("call of `{}` produced no value", Self::name(function)) })
    }

    fn build_return(&mut self, value: BasicValueEnum<'ctx>) -> Result<(), BackendError> {
        self.builder.build_return(Some(&value))?;

        Ok(())
    }

    fn finish_unit(&mut self) -> Result<(), BackendError> {
        let optimize = self.optimize;
        let machine = &self.machine;
        let unit = self.unit.as_mut().ok_or(BackendError::NoUnit)?;

        unit.module.verify().map_err(|message| BackendError::Llvm { message: message.to_string() })?;

        if optimize {
            unit.module.run_passes(PASSES, machine, PassBuilderOptions::create())
                .map_err(|message| BackendError::Llvm { message: message.to_string() })?;
        }

        let engine = unit.module.create_jit_execution_engine(OptimizationLevel::None)
            .map_err(|message| BackendError::Llvm { message: message.to_string() })?;

        for function in unit.module.get_functions() {
            if function.count_basic_blocks() > 0 {
                continue;
            }

            let name = Self::name(function);

            if let Some((_, primitive)) = host::PRIMITIVES.iter().find(|(primitive, _)| *primitive == name) {
                engine.add_global_mapping(&function, *primitive as usize);
                continue;
            }

            // MCJIT aborts the process on a missing symbol, so look first
            let used = !unsafe { core::LLVMGetFirstUse(function.as_value_ref()) }.is_null();

            if used && !Self::is_external(&name) {
                unit.unresolved.push(name);
            }
        }

        unit.engine = Some(engine);

        Ok(())
    }

    fn execute(&mut self, function: FunctionValue<'ctx>) -> Result<f64, BackendError> {
        let unit = self.unit.as_ref().ok_or(BackendError::NoUnit)?;

        if let Some(name) = unit.unresolved.first() {
            return Err(BackendError::UnresolvedSymbol { name: name.clone() });
        }

        let engine = unit.engine.as_ref().ok_or(BackendError::Llvm {
            message: "unit was not finished".to_string(),
        })?;

        let name = Self::name(function);

        let entry: JitFunction<EntryPoint> = unsafe { engine.get_function(&name) }
            .map_err(|err| BackendError::Llvm { message: err.to_string() })?;

        Ok(unsafe { entry.call() })
    }

    fn dump(&self) -> String {
        self.unit.as_ref()
            .map(|unit| unit.module.print_to_string().to_string())
            .unwrap_or_default()
    }
}
