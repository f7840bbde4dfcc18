use funcscript::runtime::error;
use funcscript::runtime::value::Value;
use funcscript::runtime::vm::Vm;

fn eval(source: &str) -> Value {
    let mut vm = Vm::new();
    vm.eval(source)
        .unwrap_or_else(|err| panic!("eval failed for {:?}: {}", source, err))
}

fn eval_err(source: &str) -> error::EvalError {
    let mut vm = Vm::new();
    vm.eval(source)
        .expect_err(&format!("expected failure for {:?}", source))
}

fn s(text: &str) -> Value {
    Value::string(text)
}

fn i(n: i64) -> Value {
    Value::Int(n)
}

#[test]
fn math_and_comparisons_work() {
    assert_eq!(eval("1 + 2 * 3"), i(7));
    assert_eq!(eval("10 / 2 + 1"), i(6));
    assert_eq!(eval("10 % 3"), i(1));
    assert_eq!(eval("10.5 % 2"), Value::Number(0.5));
    assert_eq!(eval("1 < 2"), Value::Bool(true));
    assert_eq!(eval("2 <= 2"), Value::Bool(true));
    assert_eq!(eval("3 <= 2"), Value::Bool(false));
    assert_eq!(eval("3 >= 2"), Value::Bool(true));
    assert_eq!(eval("1 == 1"), Value::Bool(true));
    assert_eq!(eval("1 != 2"), Value::Bool(true));
    assert_eq!(eval("1 = 1"), Value::Bool(true));
}

#[test]
fn integer_arithmetic_promotes_on_overflow() {
    assert_eq!(
        eval("9223372036854775807 + 1").to_string(),
        "9223372036854775808"
    );
    assert!(matches!(eval("9223372036854775807 + 1"), Value::BigInt(_)));
    // Shrinks back down when the result fits.
    assert_eq!(eval("9223372036854775808 - 1"), i(i64::MAX));
}

#[test]
fn division_by_zero_fails() {
    let err = eval_err("1 / 0");
    assert_eq!(err.code, error::INVALID_ARGUMENT.code);
}

#[test]
fn if_then_else_keyword_form_works() {
    assert_eq!(eval("if 1 < 2 then 10 else 20"), i(10));
    assert_eq!(eval("if 1 > 2 then 10 else 20"), i(20));
}

#[test]
fn if_native_works() {
    assert_eq!(eval("If(true, 10, 20)"), i(10));
    assert_eq!(eval("If(false, 10, 20)"), i(20));
}

#[test]
fn keyword_operators_work() {
    assert_eq!(eval("true and false"), Value::Bool(false));
    assert_eq!(eval("true or false"), Value::Bool(true));
    assert_eq!(eval("nil and nil"), Value::Nil);
    assert_eq!(eval("nil or nil"), Value::Nil);
    assert_eq!(eval("nil and true"), Value::Bool(true));
}

#[test]
fn not_operator_is_boolean_only() {
    assert_eq!(eval("not true"), Value::Bool(false));
    assert_eq!(eval("!false"), Value::Bool(true));
    let err = eval_err("not nil");
    assert_eq!(err.code, error::TYPE_MISMATCH.code);
}

#[test]
fn lists_work() {
    assert_eq!(eval("[1, 2, 3]"), Value::list(vec![i(1), i(2), i(3)]));
    assert_eq!(eval("Len([1,2,3])"), i(3));
    assert_eq!(eval("First([9,8,7])"), i(9));
    assert_eq!(eval("[1,2] + [3]"), Value::list(vec![i(1), i(2), i(3)]));
    assert_eq!(eval("[1,2][1]"), i(2));
    assert_eq!(eval("[1,2][5]"), Value::Nil);
}

#[test]
fn strings_concatenate_with_plus() {
    assert_eq!(eval(r#""a" + "b""#), s("ab"));
    assert_eq!(eval(r#"3 + "cool""#), s("3cool"));
    assert_eq!(eval(r#""cool" + 4"#), s("cool4"));
    assert_eq!(eval(r#"Len("hello")"#), i(5));
    assert_eq!(eval(r#"First("hello")"#), s("h"));
    assert_eq!(eval(r#""hello"[1]"#), s("e"));
}

#[test]
fn huge_range_does_not_allocate_list() {
    assert_eq!(eval("Len(Range(0, 1000000000))"), i(1_000_000_000));
    assert_eq!(eval("Range(3, 4)[0]"), i(3));
    assert_eq!(eval("Range(3, 4)[3]"), i(6));
    assert_eq!(eval("Range(3, 4)[4]"), Value::Nil);
}

#[test]
fn sum_of_huge_range_uses_closed_form() {
    assert_eq!(
        eval("Sum(Range(1, 1000000000))").to_string(),
        "500000000500000000"
    );
    assert_eq!(eval("Sum([4,5,6])"), i(15));
}

#[test]
fn range_with_negative_count_is_a_captured_error() {
    let value = eval("Range(1, -1)");
    assert!(matches!(value, Value::Error(_)));
}

#[test]
fn maps_and_property_access_work() {
    assert_eq!(eval("{a: 1, b: 2}.a"), i(1));
    assert_eq!(eval("{a: 1, b: 2}.b"), i(2));
    assert_eq!(eval("{a: 1, b: 2}.missing"), Value::Nil);
    assert_eq!(eval("Len({a: 1, b: 2})"), i(2));
}

#[test]
fn kvc_entries_see_earlier_keys() {
    assert_eq!(eval("{a: 2, b: a + 1}.b"), i(3));
    assert_eq!(eval("{a: 1, b: 2, return a + b}"), i(3));
}

#[test]
fn naked_kvc_root_works() {
    assert_eq!(eval("a: 1; b: 2; return a + b"), i(3));
}

#[test]
fn duplicate_key_keeps_position_and_last_value() {
    let value = eval("{a: 1, b: 2, a: 3}");
    let Value::Kvc(kvc) = &value else {
        panic!("expected a kvc, got {}", value);
    };
    let keys: Vec<String> = kvc.borrow().keys().map(String::from).collect();
    assert_eq!(keys, vec!["a", "b"]);
    assert_eq!(eval("{a: 1, b: 2, a: 3}.a"), i(3));
}

#[test]
fn kvc_addition_merges_nested_kvcs() {
    assert_eq!(eval("({a:12,b:{c:10,z:10}}+{d:13,b:{c:12,x:5}}).a"), i(12));
    assert_eq!(eval("({a:12,b:{c:10,z:10}}+{d:13,b:{c:12,x:5}}).d"), i(13));
    assert_eq!(eval("({a:12,b:{c:10,z:10}}+{d:13,b:{c:12,x:5}}).b.c"), i(12));
    assert_eq!(eval("({a:12,b:{c:10,z:10}}+{d:13,b:{c:12,x:5}}).b.z"), i(10));
    assert_eq!(eval("({a:12,b:{c:10,z:10}}+{d:13,b:{c:12,x:5}}).b.x"), i(5));
}

#[test]
fn kvc_addition_replaces_lists_with_rightmost_value() {
    assert_eq!(eval("({x:[1,2]}+{x:[3]}).x[0]"), i(3));
    assert_eq!(eval("Len(({x:[1,2]}+{x:[3]}).x)"), i(1));
}

#[test]
fn kvc_addition_prefers_right_scalar_over_left_collection() {
    assert_eq!(eval("({a:{x:1,y:2}}+{a:5}).a"), i(5));
}

#[test]
fn lambdas_can_be_called_and_use_parameters() {
    assert_eq!(eval("((x)=> x + 1)(2)"), i(3));
    assert_eq!(eval("((x,y)=> x * y)(3,4)"), i(12));
    assert_eq!(eval("(() => 42)()"), i(42));
}

#[test]
fn calling_lambda_with_missing_args_pads_nil() {
    assert_eq!(
        eval(r#"{name: "Esubalew", say_hello: (who) => "Hello " + who, return say_hello()}"#),
        s("Hello ")
    );
}

#[test]
fn calling_lambda_with_extra_args_fails() {
    let err = eval_err("((x)=>x)(1,2)");
    assert_eq!(err.code, error::INVALID_ARGUMENT.code);
}

#[test]
fn lambdas_capture_their_scope() {
    assert_eq!(eval("{a: 2, f: (x) => x + a, return f(4)}"), i(6));
}

#[test]
fn recursion_works_and_is_bounded() {
    assert_eq!(
        eval("{f: (n) => if n = 0 then 0 else f(n - 1) + 1, return f(10)}"),
        i(10)
    );
    let err = eval_err("{f: (n) => f(n), return f(1)}");
    assert_eq!(err.code, error::RECURSION_LIMIT_EXCEEDED.code);
}

#[test]
fn native_functions_work() {
    assert_eq!(eval("Abs(-5)"), i(5));
    assert_eq!(eval("Max(2, 9)"), i(9));
    assert_eq!(eval("Min(2, 9)"), i(2));
    assert_eq!(eval("Sqrt(9)"), Value::Number(3.0));
    assert_eq!(eval("TypeOf(1)"), s("Int"));
    assert_eq!(eval("TypeOf(1.5)"), s("Number"));
    assert_eq!(eval("TypeOf(nil)"), s("Nil"));
}

#[test]
fn guid_datetime_and_bytes_constructors_work() {
    let guid = eval("Guid('00000000-0000-0000-0000-000000000000')");
    assert_eq!(guid, Value::Guid(uuid::Uuid::nil()));

    let dt = eval("DateTime('2020-01-01T00:00:00Z')");
    assert!(matches!(dt, Value::DateTime(_)));

    let bytes = eval("Bytes('AQID')");
    assert_eq!(bytes, Value::Bytes(vec![1u8, 2, 3].into()));

    assert!(matches!(eval("Guid('nope')"), Value::Error(_)));
}

#[test]
fn parse_errors_carry_location() {
    let err = eval_err("If(true, 1, )");
    assert_eq!(err.code, error::PARSE_ERROR.code);
    assert_eq!(err.line, 1);
    assert!(err.column >= 1);
}

#[test]
fn unknown_identifiers_are_nil() {
    assert_eq!(eval("definitely_not_bound"), Value::Nil);
}

#[test]
fn vm_can_be_reused_across_multiple_eval_calls() {
    let mut vm = Vm::new();
    assert_eq!(vm.eval("1+2").unwrap(), i(3));
    assert_eq!(vm.eval("3+4").unwrap(), i(7));
}

#[test]
fn comments_are_ignored() {
    assert_eq!(eval("1 + /* two */ 2 // trailing"), i(3));
}
