//! Integration tests for whole-method analysis.
//!
//! Each test assembles a small method body against a synthetic core library, analyzes it
//! through an [`AnalysisSession`] and checks the return value, the marks and the
//! diagnostics the host received.

use dotreach::{
    analysis::{value::GenericOwner, DataflowState, LocalKey, OperandStack},
    metadata::types::GenericParamDesc,
    prelude::*,
};

const CORLIB: &str = "System.Runtime";

/// A core library with just enough reflection surface, and an application type `App.Foo`
/// with a public parameterless and a public one-argument constructor.
struct World {
    store: MetadataStore,
    object: Token,
    type_type: Token,
    object_get_type: Token,
    get_type_from_handle: Token,
    create_instance: Token,
    create_instance_args: Token,
    foo: Token,
    foo_ctor: Token,
    foo_ctor_int: Token,
    program: Token,
}

impl World {
    fn new() -> Self {
        let mut store = MetadataStore::new();
        let public = TypeAttributes::PUBLIC;
        let statics = MethodAttributes::PUBLIC | MethodAttributes::STATIC;
        let ctor = MethodAttributes::PUBLIC
            | MethodAttributes::SPECIAL_NAME
            | MethodAttributes::RT_SPECIAL_NAME;

        let object = store.add_type(CORLIB, "System", "Object", public, None);
        let value_type = store.add_type(CORLIB, "System", "ValueType", public, Some(object));
        let handle = store.add_type(
            CORLIB,
            "System",
            "RuntimeTypeHandle",
            public | TypeAttributes::SEALED,
            Some(value_type),
        );
        let type_type = store.add_type(
            CORLIB,
            "System",
            "Type",
            public | TypeAttributes::ABSTRACT,
            Some(object),
        );
        let type_sig = TypeSignature::Class(type_type);
        let object_get_type = store.add_method(
            object,
            "GetType",
            MethodAttributes::PUBLIC,
            SignatureMethod::new_instance(type_sig.clone(), vec![]),
        );
        let get_type_from_handle = store.add_method(
            type_type,
            "GetTypeFromHandle",
            statics,
            SignatureMethod::new_static(type_sig.clone(), vec![TypeSignature::ValueType(handle)]),
        );
        let activator = store.add_type(
            CORLIB,
            "System",
            "Activator",
            public | TypeAttributes::ABSTRACT | TypeAttributes::SEALED,
            Some(object),
        );
        let create_instance = store.add_method(
            activator,
            "CreateInstance",
            statics,
            SignatureMethod::new_static(TypeSignature::Object, vec![type_sig.clone()]),
        );
        let create_instance_args = store.add_method(
            activator,
            "CreateInstance",
            statics,
            SignatureMethod::new_static(
                TypeSignature::Object,
                vec![type_sig, TypeSignature::SzArray(Box::new(TypeSignature::Object))],
            ),
        );

        let foo = store.add_type("App", "App", "Foo", public, Some(object));
        let foo_ctor = store.add_method(
            foo,
            ".ctor",
            ctor,
            SignatureMethod::new_instance(TypeSignature::Void, vec![]),
        );
        let foo_ctor_int = store.add_method(
            foo,
            ".ctor",
            ctor,
            SignatureMethod::new_instance(TypeSignature::Void, vec![TypeSignature::I4]),
        );
        let program = store.add_type(
            "App",
            "App",
            "Program",
            public | TypeAttributes::ABSTRACT | TypeAttributes::SEALED,
            Some(object),
        );

        World {
            store,
            object,
            type_type,
            object_get_type,
            get_type_from_handle,
            create_instance,
            create_instance_args,
            foo,
            foo_ctor,
            foo_ctor_int,
            program,
        }
    }

    /// Defines a static method on `App.Program` with the given body.
    fn define(
        &mut self,
        name: &str,
        signature: SignatureMethod,
        body: &mut MethodBodyBuilder,
    ) -> Result<Token> {
        let method = self.store.add_method(
            self.program,
            name,
            MethodAttributes::PUBLIC | MethodAttributes::STATIC,
            signature,
        );
        self.store.set_method_body(method, body.build()?);
        Ok(method)
    }
}

fn analyze(world: &World, method: Token) -> Result<(MethodAnalysis, RecordingHost<'_, MetadataStore>)> {
    let host = RecordingHost::new(&world.store);
    let analysis = AnalysisSession::new(&host, AnalysisConfig::sequential()).analyze_method(method)?;
    Ok((analysis, host))
}

fn strings(values: &[&str]) -> MultiValue {
    values
        .iter()
        .fold(MultiValue::empty(), |set, s| set.merge(&MultiValue::single(AbstractValue::string(s))))
}

/// `T Create<T>() => Activator.CreateInstance(GetType()) as T`, analyzed as `Create<Foo>`.
#[test]
fn activation_through_get_type_marks_cast_target() -> Result<()> {
    let mut world = World::new();
    let factory = world.store.add_type(
        "App",
        "App",
        "Factory",
        TypeAttributes::PUBLIC,
        Some(world.object),
    );
    let result = world.store.add_type_spec(TypeSignature::GenericParamMethod(0));
    let create = world.store.add_method(
        factory,
        "Create",
        MethodAttributes::PUBLIC,
        SignatureMethod::new_instance(TypeSignature::GenericParamMethod(0), vec![]),
    );
    world.store.set_generic_params(
        GenericOwner::Method(create),
        vec![GenericParamDesc::new(0, "T")],
    );
    world.store.set_method_body(
        create,
        MethodBodyBuilder::new()
            .ldarg(0)
            .callvirt(world.object_get_type)
            .call(world.create_instance)
            .token(OpCode::Isinst, result)
            .token(OpCode::UnboxAny, result)
            .emit(OpCode::Ret)
            .build()?,
    );

    let host = RecordingHost::new(&world.store);
    let session = AnalysisSession::new(&host, AnalysisConfig::sequential());
    session.analyze_instantiation(create, Vec::new(), vec![TypeSignature::Class(world.foo)])?;

    assert!(host.marks.contains(MemberKind::Method, world.foo_ctor));
    assert!(!host.marks.contains(MemberKind::Method, world.foo_ctor_int));
    assert!(host.diagnostics.is_empty());
    Ok(())
}

/// `Activator.CreateInstance(t, new object[0])` with an unknown `t`.
#[test]
fn activation_of_unknown_type_defers_requirement() -> Result<()> {
    let mut world = World::new();
    let object = world.object;
    let create_instance_args = world.create_instance_args;
    let method = world.define(
        "Make",
        SignatureMethod::new_static(TypeSignature::Object, vec![]),
        MethodBodyBuilder::new()
            .local(TypeSignature::Class(world.type_type))
            .ldloc(0)
            .ldc_i4(0)
            .token(OpCode::Newarr, object)
            .call(create_instance_args)
            .emit(OpCode::Ret),
    )?;

    let (analysis, host) = analyze(&world, method)?;

    assert!(host.marks.is_empty());
    let returned: Vec<_> = analysis.return_value.iter().collect();
    assert_eq!(returned.len(), 1);
    match returned[0] {
        AbstractValue::MethodReturn(placeholder) => {
            assert_eq!(placeholder.method, create_instance_args);
            assert_eq!(
                placeholder.requirement,
                MemberTypes::PUBLIC_PARAMETERLESS_CONSTRUCTOR
            );
        }
        other => panic!("unexpected return value {other}"),
    }
    assert!(host
        .diagnostics
        .has_code(DiagnosticCode::UnrecognizedValue {
            target: dotreach::analysis::value::SourceKind::Parameter
        }));
    Ok(())
}

/// `ldc.i4.5; ldc.i4.3; add; ret`
#[test]
fn arithmetic_is_unknown() -> Result<()> {
    let mut world = World::new();
    let method = world.define(
        "Sum",
        SignatureMethod::new_static(TypeSignature::I4, vec![]),
        MethodBodyBuilder::new()
            .ldc_i4(5)
            .ldc_i4(3)
            .emit(OpCode::Add)
            .emit(OpCode::Ret),
    )?;

    let (analysis, host) = analyze(&world, method)?;
    assert!(analysis.return_value.is_unknown());
    assert!(host.diagnostics.is_empty());
    Ok(())
}

/// Two branches store different strings into a local that is read after the join.
#[test]
fn join_merges_local_values() -> Result<()> {
    let mut world = World::new();
    let method = world.define(
        "Pick",
        SignatureMethod::new_static(TypeSignature::String, vec![TypeSignature::Boolean]),
        MethodBodyBuilder::new()
            .local(TypeSignature::String)
            .ldarg(0)
            .branch(OpCode::Brtrue, "other")
            .ldstr("a")
            .stloc(0)
            .branch(OpCode::Br, "join")
            .label("other")
            .ldstr("b")
            .stloc(0)
            .label("join")
            .ldloc(0)
            .emit(OpCode::Ret),
    )?;

    let (analysis, host) = analyze(&world, method)?;
    assert_eq!(analysis.return_value, strings(&["a", "b"]));
    assert!(host.diagnostics.is_empty());
    Ok(())
}

/// A value left on the stack by both arms of a conditional survives the join.
#[test]
fn stack_is_balanced_at_joins() -> Result<()> {
    let mut world = World::new();
    let method = world.define(
        "Choose",
        SignatureMethod::new_static(TypeSignature::String, vec![TypeSignature::Boolean]),
        MethodBodyBuilder::new()
            .ldarg(0)
            .branch(OpCode::Brtrue, "other")
            .ldstr("left")
            .branch(OpCode::Br, "join")
            .label("other")
            .ldstr("right")
            .label("join")
            .emit(OpCode::Ret),
    )?;

    let (analysis, host) = analyze(&world, method)?;
    assert_eq!(analysis.return_value, strings(&["left", "right"]));
    assert!(!host.diagnostics.has_code(DiagnosticCode::InvalidIl));

    let states = analysis.states.expect("converged analysis keeps its states");
    for state in &states.in_states {
        if let OperandStack::Stack(slots) = &state.stack {
            assert!(slots.len() <= 1);
        }
    }
    Ok(())
}

/// `newarr [2]; stelem [0] = typeof(Foo); ldelem [0]` in one block.
#[test]
fn array_element_round_trips_within_block() -> Result<()> {
    let mut world = World::new();
    let (type_type, foo, from_handle) = (world.type_type, world.foo, world.get_type_from_handle);
    let method = world.define(
        "First",
        SignatureMethod::new_static(TypeSignature::Class(type_type), vec![]),
        MethodBodyBuilder::new()
            .ldc_i4(2)
            .token(OpCode::Newarr, type_type)
            .emit(OpCode::Dup)
            .ldc_i4(0)
            .token(OpCode::Ldtoken, foo)
            .call(from_handle)
            .emit(OpCode::StelemRef)
            .ldc_i4(0)
            .emit(OpCode::LdelemRef)
            .emit(OpCode::Ret),
    )?;

    let (analysis, _) = analyze(&world, method)?;
    assert_eq!(
        analysis.return_value,
        MultiValue::single(AbstractValue::KnownType(foo))
    );
    Ok(())
}

/// Stores to more distinct constant indices than the tracking limit.
#[test]
fn array_tracking_is_bounded() -> Result<()> {
    let mut world = World::new();
    let object = world.object;
    let build = |read: i32| {
        let mut body = MethodBodyBuilder::new();
        body.local(TypeSignature::SzArray(Box::new(TypeSignature::Object)))
            .ldc_i4(64)
            .token(OpCode::Newarr, object)
            .stloc(0);
        for index in 0..40 {
            body.ldloc(0)
                .ldc_i4(index)
                .ldstr(&format!("value{index}"))
                .emit(OpCode::StelemRef);
        }
        body.ldloc(0).ldc_i4(read).emit(OpCode::LdelemRef).emit(OpCode::Ret);
        body
    };
    let signature = || SignatureMethod::new_static(TypeSignature::Object, vec![]);
    let tracked = world.define("Tracked", signature(), &mut build(3))?;
    let dropped = world.define("Dropped", signature(), &mut build(35))?;

    let (analysis, _) = analyze(&world, tracked)?;
    assert_eq!(analysis.return_value, strings(&["value3"]));

    let (analysis, _) = analyze(&world, dropped)?;
    assert!(analysis.return_value.is_unknown());

    let states = analysis.states.expect("converged analysis keeps its states");
    for state in states.out_states.iter().chain(&states.in_states) {
        let array = state.locals.get(&LocalKey::Local(0));
        for value in array.iter() {
            if let AbstractValue::Array(array) = value {
                assert!(array.tracked_len() <= AnalysisConfig::default().max_tracked_array_values);
            }
        }
    }
    Ok(())
}

/// A catch handler starts from unknown locals and joins with the protected region.
#[test]
fn handler_paths_join_after_region() -> Result<()> {
    let mut world = World::new();
    let object = world.object;
    let method = world.define(
        "Guarded",
        SignatureMethod::new_static(TypeSignature::String, vec![]),
        MethodBodyBuilder::new()
            .local(TypeSignature::String)
            .label("try")
            .ldstr("a")
            .stloc(0)
            .branch(OpCode::Leave, "end")
            .label("catch")
            .emit(OpCode::Pop)
            .ldstr("b")
            .stloc(0)
            .branch(OpCode::Leave, "end")
            .label("end")
            .ldloc(0)
            .emit(OpCode::Ret)
            .handler(
                ExceptionHandlerFlags::empty(),
                ("try", "catch"),
                ("catch", "end"),
                Some(object),
                None,
            ),
    )?;

    let (analysis, host) = analyze(&world, method)?;
    assert_eq!(analysis.return_value, strings(&["a", "b"]));
    assert!(!host.diagnostics.has_code(DiagnosticCode::InvalidIl));
    Ok(())
}

#[test]
fn stack_underflow_is_reported_not_fatal() -> Result<()> {
    let mut world = World::new();
    let method = world.define(
        "Broken",
        SignatureMethod::new_static(TypeSignature::Void, vec![]),
        MethodBodyBuilder::new().emit(OpCode::Pop).emit(OpCode::Ret),
    )?;

    let (analysis, host) = analyze(&world, method)?;
    assert!(analysis.converged());
    let reports = host.diagnostics.with_code(DiagnosticCode::InvalidIl);
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].code.number(), 9001);
    Ok(())
}

#[test]
fn batches_are_deterministic() -> Result<()> {
    let mut world = World::new();
    let (foo, from_handle, create) = (world.foo, world.get_type_from_handle, world.create_instance);
    let mut methods = Vec::new();
    for index in 0..16 {
        let mut body = MethodBodyBuilder::new();
        body.ldarg(0).branch(OpCode::Brfalse, "unknown");
        body.token(OpCode::Ldtoken, foo).call(from_handle).call(create).emit(OpCode::Ret);
        body.label("unknown").emit(OpCode::Ldnull).call(create).emit(OpCode::Ret);
        methods.push(world.define(
            &format!("Make{index}"),
            SignatureMethod::new_static(TypeSignature::Object, vec![TypeSignature::Boolean]),
            &mut body,
        )?);
    }

    type BlockStates = Option<(Vec<DataflowState>, Vec<DataflowState>)>;
    let run = |config: AnalysisConfig| {
        let host = RecordingHost::new(&world.store);
        let analyses: Vec<(MultiValue, BlockStates)> = AnalysisSession::new(&host, config)
            .analyze_methods(&methods)
            .into_iter()
            .map(|result| {
                result.map(|analysis| {
                    let states = analysis
                        .states
                        .map(|states| (states.in_states, states.out_states));
                    (analysis.return_value, states)
                })
            })
            .collect::<Result<_>>()?;
        Ok::<_, Error>((analyses, host.marks.members(), host.diagnostics.sorted()))
    };

    let sequential = run(AnalysisConfig::sequential())?;
    let parallel = run(AnalysisConfig::default())?;
    let again = run(AnalysisConfig::default())?;
    assert_eq!(sequential, parallel);
    assert_eq!(parallel, again);
    assert!(sequential.0.iter().all(|(_, states)| states.is_some()));
    assert!(sequential.1.iter().any(|m| m.token == world.foo_ctor));
    Ok(())
}

/// Both arms of a conditional store into the same array, and a store after the join
/// writes another index. The element stored on each arm is still visible afterwards.
#[test]
fn array_stores_after_join_keep_both_paths() -> Result<()> {
    let mut world = World::new();
    let object = world.object;
    let build = |read: i32| {
        let mut body = MethodBodyBuilder::new();
        body.local(TypeSignature::SzArray(Box::new(TypeSignature::Object)))
            .ldc_i4(2)
            .token(OpCode::Newarr, object)
            .stloc(0)
            .ldarg(0)
            .branch(OpCode::Brtrue, "other")
            .ldloc(0)
            .ldc_i4(0)
            .ldstr("a")
            .emit(OpCode::StelemRef)
            .branch(OpCode::Br, "join")
            .label("other")
            .ldloc(0)
            .ldc_i4(0)
            .ldstr("b")
            .emit(OpCode::StelemRef)
            .label("join")
            .ldloc(0)
            .ldc_i4(1)
            .ldstr("c")
            .emit(OpCode::StelemRef)
            .ldloc(0)
            .ldc_i4(read)
            .emit(OpCode::LdelemRef)
            .emit(OpCode::Ret);
        body
    };
    let signature = || SignatureMethod::new_static(TypeSignature::Object, vec![TypeSignature::Boolean]);
    let first = world.define("First", signature(), &mut build(0))?;
    let second = world.define("Second", signature(), &mut build(1))?;

    let (analysis, host) = analyze(&world, first)?;
    assert_eq!(analysis.return_value, strings(&["a", "b"]));
    assert!(host.diagnostics.is_empty());

    let (analysis, _) = analyze(&world, second)?;
    assert_eq!(analysis.return_value, strings(&["c"]));
    Ok(())
}

/// The type activated is stored on one arm only; the other arm leaves the element unset.
/// After the join the element is not known, so the activation cannot be resolved.
#[test]
fn array_element_stored_on_one_path_is_unknown_after_join() -> Result<()> {
    let mut world = World::new();
    let (type_type, foo, from_handle, create) = (
        world.type_type,
        world.foo,
        world.get_type_from_handle,
        world.create_instance,
    );
    let method = world.define(
        "Maybe",
        SignatureMethod::new_static(TypeSignature::Object, vec![TypeSignature::Boolean]),
        MethodBodyBuilder::new()
            .local(TypeSignature::SzArray(Box::new(TypeSignature::Class(type_type))))
            .ldc_i4(1)
            .token(OpCode::Newarr, type_type)
            .stloc(0)
            .ldarg(0)
            .branch(OpCode::Brfalse, "join")
            .ldloc(0)
            .ldc_i4(0)
            .token(OpCode::Ldtoken, foo)
            .call(from_handle)
            .emit(OpCode::StelemRef)
            .label("join")
            .ldloc(0)
            .ldc_i4(0)
            .emit(OpCode::LdelemRef)
            .call(create)
            .emit(OpCode::Ret),
    )?;

    let (_, host) = analyze(&world, method)?;
    assert!(!host.marks.contains(MemberKind::Method, world.foo_ctor));
    assert!(host.diagnostics.has_code(DiagnosticCode::UnrecognizedValue {
        target: dotreach::analysis::value::SourceKind::Parameter
    }));
    Ok(())
}

#[test]
fn state_meet_laws() {
    let a = {
        let mut state = DataflowState::new();
        state.locals.set(LocalKey::Local(0), MultiValue::single(AbstractValue::string("a")));
        state.stack.push(MultiValue::single(AbstractValue::ConstInt(1)));
        state
    };
    let b = {
        let mut state = DataflowState::new();
        state.locals.set(LocalKey::Local(0), MultiValue::single(AbstractValue::string("b")));
        state.stack.push(MultiValue::single(AbstractValue::Null));
        state
    };
    let c = {
        let mut state = DataflowState::new();
        state.locals.set(LocalKey::Argument(1), MultiValue::single(AbstractValue::ConstInt(7)));
        state.stack.push(MultiValue::unknown());
        state
    };
    let top = DataflowState::top();

    assert_eq!(a.meet(&a), a);
    assert_eq!(a.meet(&b), b.meet(&a));
    assert_eq!(a.meet(&b.meet(&c)), a.meet(&b).meet(&c));
    assert_eq!(a.meet(&top), a);
    assert_eq!(top.meet(&b), b);

    let merged = a.meet(&b);
    assert_eq!(merged.locals.get(&LocalKey::Local(0)), strings(&["a", "b"]));
    assert!(a.meet(&c).stack.peek().is_some_and(MultiValue::is_unknown));
}

#[test]
fn merges_stay_flat() {
    let a = MultiValue::single(AbstractValue::string("a"));
    let b = MultiValue::single(AbstractValue::KnownType(Token::new(0x0200_0001)));
    let c = MultiValue::single(AbstractValue::ConstInt(3));

    let nested = a.merge(&b).merge(&c);
    assert_eq!(nested.len(), 3);
    assert_eq!(nested, a.merge(&b.merge(&c)));
    assert!(nested.iter().all(|v| !matches!(v, AbstractValue::Unknown)));
    assert!(nested.merge(&MultiValue::unknown()).is_unknown());
    assert_eq!(nested.merge(&MultiValue::empty()), nested);
}
