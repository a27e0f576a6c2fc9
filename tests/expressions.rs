use std::sync::Arc;

use jsexpr::{
    compile, eval, evaluate, parse, register_constant, register_function, tokenize, unregister,
    Environment, Error, Evaluator, Value,
};

fn json_env(json: serde_json::Value) -> Environment {
    match json {
        serde_json::Value::Object(map) => Environment::from(map),
        other => panic!("expected a JSON object, got {other}"),
    }
}

fn assert_evaluates(src: &str, expected: impl Into<Value>) {
    let expected = expected.into();
    match eval(src, &Environment::new()) {
        Ok(value) => assert_eq!(value, expected, "{src}"),
        Err(e) => panic!("{src} failed: {e}"),
    }
}

#[test]
fn precedence() {
    assert_evaluates("1+2*3", 7);
    assert_evaluates("(1+2)*3", 9);
    assert_evaluates("1 + 2 > 2 && 3 < 4", true);
    assert_evaluates("1 | 2 ^ 3 & 4", 3);
}

#[test]
fn associativity() {
    assert_evaluates("1-2-3", -4);
    assert_evaluates("12/3/2", 2);
    assert_evaluates("2**3**2", 512);
}

#[test]
fn unary_and_binary_signs() {
    assert_evaluates("2+-1", 1);
    assert_evaluates("-2*3", -6);
    assert_evaluates("+2*3", 6);
    assert_evaluates("2 - -2", 4);
    assert_evaluates("-(1+2)", -3);
    assert_evaluates("!!1", true);
}

#[test]
fn ternary_chains_to_the_right() {
    assert_evaluates("false?2:true?3:4", 3);
    assert_evaluates("1 > 2 ? 'a' : 'b'", "b");
}

#[test]
fn member_access() {
    let env = json_env(serde_json::json!({"obj": {"color": "green"}}));
    assert_eq!(eval("obj.color", &env).unwrap(), Value::from("green"));
    assert_eq!(eval(r#"obj["co"+"lor"]"#, &env).unwrap(), Value::from("green"));
    assert_eq!(eval("obj.colour", &env).unwrap(), Value::Undefined);
}

#[test]
fn literal_construction() {
    assert_evaluates("[1+1,2*4]", vec![Value::from(2), Value::from(8)]);
    assert_eq!(
        eval(r#"{"a":1}"#, &Environment::new()).unwrap(),
        Value::from(serde_json::json!({"a": 1}))
    );
    assert_evaluates("[1,2,3].length", 3);
    assert_eq!(
        eval("{label: name}", &Environment::new().with_var("name", "ignored")).unwrap(),
        Value::from(serde_json::json!({"label": "name"}))
    );
    assert_evaluates("'😀'.length", 2);
}

#[test]
fn unknown_names_never_resolve_to_the_host() {
    for name in ["window", "process", "globalThis", "Math", "require", "this"] {
        match eval(name, &Environment::new()) {
            Err(Error::UndefinedVariable(missing)) => assert_eq!(missing, name),
            other => panic!("{name} resolved to {other:?}"),
        }
    }
    assert!(matches!(
        eval("alert(1)", &Environment::new()),
        Err(Error::FunctionNotFound(_))
    ));
}

#[test]
fn compiling_is_repeatable() {
    let src = "a ? [1, {b: -2}] : f(x, y.z)";
    assert_eq!(tokenize(src).unwrap(), tokenize(src).unwrap());
    assert_eq!(
        parse(tokenize(src).unwrap()).unwrap().tokens(),
        compile(src).unwrap().tokens()
    );
}

#[test]
fn one_rpn_many_environments() {
    let rpn = compile(r#"options["method"] == 3"#).unwrap();
    let three = json_env(serde_json::json!({"options": {"method": 3}}));
    let two = json_env(serde_json::json!({"options": {"method": 2}}));

    assert_eq!(evaluate(&rpn, &three).unwrap(), Value::Bool(true));
    assert_eq!(evaluate(&rpn, &two).unwrap(), Value::Bool(false));
    assert_eq!(evaluate(&rpn, &three).unwrap(), Value::Bool(true));
}

#[test]
fn evaluations_share_an_rpn_across_threads() {
    let rpn = Arc::new(compile("base * factor + 1").unwrap());
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let rpn = Arc::clone(&rpn);
            std::thread::spawn(move || {
                let env = Environment::new().with_var("base", i).with_var("factor", 10);
                evaluate(&rpn, &env).unwrap()
            })
        })
        .collect();
    for (i, handle) in handles.into_iter().enumerate() {
        assert_eq!(handle.join().unwrap(), Value::Number(i as f64 * 10.0 + 1.0));
    }
}

#[test]
fn failed_evaluation_can_be_retried() {
    let rpn = compile("limit - used").unwrap();
    let partial = Environment::new().with_var("limit", 10);
    assert!(matches!(
        evaluate(&rpn, &partial),
        Err(Error::UndefinedVariable(name)) if name == "used"
    ));
    let full = partial.with_var("used", 4);
    assert_eq!(evaluate(&rpn, &full).unwrap(), Value::from(6));
}

#[test]
fn registry_sits_beneath_the_caller_environment() {
    register_constant("expressions_test_rate", 3);
    register_function("expressions_test_scale", |args| match args {
        [Value::Number(a), Value::Number(b)] => Ok(Value::Number(a * b)),
        _ => Err("scale takes two numbers".to_string()),
    });

    let src = "expressions_test_scale(expressions_test_rate, 2)";
    assert_eq!(eval(src, &Environment::new()).unwrap(), Value::from(6));

    let env = Environment::new().with_var("expressions_test_rate", 5);
    assert_eq!(eval(src, &env).unwrap(), Value::from(10));

    unregister("expressions_test_rate");
    unregister("expressions_test_scale");
    assert!(matches!(
        eval(src, &Environment::new()),
        Err(Error::UndefinedVariable(_))
    ));
}

#[test]
fn parent_environments_are_shared() {
    let shared = Arc::new(Environment::new().with_var("tax", 0.5));
    let first = Environment::with_parent(Arc::clone(&shared)).with_var("price", 10);
    let second = Environment::with_parent(shared).with_var("price", 4);

    let rpn = compile("price + price * tax").unwrap();
    assert_eq!(Evaluator::new(&first).eval(&rpn).unwrap(), Value::from(15));
    assert_eq!(Evaluator::new(&second).eval(&rpn).unwrap(), Value::from(6));
}

#[test]
fn errors_are_distinct() {
    let env = Environment::new();
    assert!(matches!(eval("1 # 2", &env), Err(Error::Tokenize { .. })));
    assert!(matches!(eval("'open", &env), Err(Error::Tokenize { .. })));
    assert!(matches!(eval("(1]", &env), Err(Error::BracketMismatch { .. })));
    assert!(matches!(eval("nope", &env), Err(Error::UndefinedVariable(_))));
    assert!(matches!(eval("nope()", &env), Err(Error::FunctionNotFound(_))));
    assert!(matches!(eval("{} - 1", &env), Err(Error::OperatorType { .. })));
}

#[test]
fn empty_expression_is_undefined() {
    assert_evaluates("", Value::Undefined);
    assert_evaluates("   ", Value::Undefined);
}
