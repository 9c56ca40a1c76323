use pare_app::KeepInfo;
use pretty_assertions::assert_eq;

use super::{AbstractFunction, BaseInFlow, CheckedStateProvider, FlowGraphStateProvider, MethodParameter};
use crate::abstract_value::AbstractValue;
use crate::dynamic_type::DynamicType;
use crate::test_helpers::{app, field, method, shapes, ty, MAIN, SHAPE};
use crate::value_state::{ConcreteValueState, ValueState};

struct Fixed(ValueState);

impl FlowGraphStateProvider for Fixed {
    fn state(&self, _: &BaseInFlow) -> ValueState {
        self.0.clone()
    }
}

fn parameter() -> BaseInFlow {
    BaseInFlow::Parameter(MethodParameter::new(method(MAIN, "run", "V", &[SHAPE]), 0))
}

fn concrete(state: ValueState) -> ConcreteValueState {
    match state {
        ValueState::Concrete(state) => state,
        other => panic!("expected a concrete state, got {other:?}"),
    }
}

#[test]
fn parameters_display_with_their_index() {
    let parameter = MethodParameter::new(method(MAIN, "run", "V", &["I"]), 1);
    assert_eq!(parameter.to_string(), "Lp/Main;->run(I)V#1");
}

#[test]
fn or_sets_the_constant_bits() {
    let app = app(shapes(), KeepInfo::new());
    let function = AbstractFunction::Or {
        base: parameter(),
        constant: 0b100,
    };
    let input = concrete(ValueState::primitive(AbstractValue::Single(0b001)));
    assert_eq!(
        function.apply(&app, &Fixed(ValueState::Unknown), &input),
        ValueState::primitive(AbstractValue::Single(0b101))
    );
}

#[test]
fn field_reads_consult_the_provider() {
    let app = app(shapes(), KeepInfo::new());
    let size = field(SHAPE, "size", "I");
    let function = AbstractFunction::InstanceFieldRead {
        receiver: parameter(),
        field: size,
    };
    assert_eq!(
        function.base_in_flow().to_vec(),
        vec![parameter(), BaseInFlow::Field(size)]
    );
    let provider = Fixed(ValueState::primitive(AbstractValue::Single(7)));
    let checked = CheckedStateProvider::new(&provider, &function);
    let receiver = concrete(ValueState::class(
        AbstractValue::Unknown,
        DynamicType::exact(ty(SHAPE)),
    ));
    assert_eq!(
        function.apply(&app, &checked, &receiver),
        ValueState::primitive(AbstractValue::Single(7))
    );
}

#[test]
#[should_panic(expected = "must not look up")]
fn identity_must_not_read_other_nodes() {
    let function = AbstractFunction::Identity(parameter());
    let provider = Fixed(ValueState::Unknown);
    CheckedStateProvider::new(&provider, &function).state(&parameter());
}
