use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use sandbox::{
    Captured, HostValue, Identity, Limits, QuickJs, Sandbox, SandboxError, Verdict,
    VerificationError, Verifier,
};
use serde_json::json;

async fn run(code: &str) -> Result<Captured, SandboxError> {
    Sandbox::new(QuickJs::new()).execute(code, Rc::new(Identity)).await
}

async fn value(code: &str) -> Option<HostValue> {
    run(code).await.expect("execution failed").value
}

/// Records every argument list it sees and resolves to the first argument.
#[derive(Default)]
struct Recorder {
    seen: RefCell<Vec<Vec<HostValue>>>,
}

impl Verifier for Recorder {
    fn verify(&self, args: Vec<HostValue>) -> Verdict {
        self.seen.borrow_mut().push(args.clone());
        Verdict::value(args.into_iter().next().unwrap_or(HostValue::Undefined))
    }
}

fn deferred_identity(args: Vec<HostValue>) -> Verdict {
    let first = args.into_iter().next().unwrap_or(HostValue::Undefined);
    Verdict::deferred(async move {
        tokio::time::sleep(Duration::from_millis(5)).await;
        Ok(first)
    })
}

#[tokio::test]
async fn synchronous_call() {
    assert_eq!(value("verify(42)").await, Some(HostValue::Number(42.0)));
}

#[tokio::test]
async fn last_call_wins() {
    assert_eq!(value("verify(1); verify(2)").await, Some(HostValue::Number(2.0)));
}

#[tokio::test]
async fn promise_continuation_is_captured() {
    assert_eq!(
        value("Promise.resolve(7).then(v => verify(v))").await,
        Some(HostValue::Number(7.0))
    );
}

#[tokio::test]
async fn chained_continuations_are_drained() {
    let code = r#"
        Promise.resolve(1)
            .then(v => v + 1)
            .then(v => new Promise(resolve => resolve(v * 10)))
            .then(v => verify(v));
    "#;
    assert_eq!(value(code).await, Some(HostValue::Number(20.0)));
}

#[tokio::test]
async fn async_function_is_drained() {
    let code = r#"
        async function compute() {
            const a = await Promise.resolve(20);
            const b = await Promise.resolve(22);
            return a + b;
        }
        compute().then(verify);
    "#;
    assert_eq!(value(code).await, Some(HostValue::Number(42.0)));
}

#[tokio::test]
async fn no_call_is_no_value() {
    let captured = run("const x = 1 + 1;").await.unwrap();
    assert_eq!(captured.value, None);
    assert_eq!(captured.calls, 0);
}

#[tokio::test]
async fn undefined_is_no_value() {
    assert_eq!(value("verify(undefined)").await, None);
    assert_eq!(value("verify()").await, None);
}

#[tokio::test]
async fn thrown_error_is_guest_evaluation_error() {
    let err = run("throw new Error('x')").await.unwrap_err();
    match err {
        SandboxError::GuestEvaluation(message) => assert!(message.contains('x'), "{}", message),
        other => panic!("expected guest evaluation error, got {:?}", other),
    }
}

#[tokio::test]
async fn error_after_bridge_call_returns_no_partial_value() {
    let err = run("verify(1); throw new TypeError('late')").await.unwrap_err();
    assert!(err.is_guest_error());
}

#[tokio::test]
async fn syntax_error_is_guest_evaluation_error() {
    let err = run("verify(").await.unwrap_err();
    assert!(err.is_guest_error());
}

#[tokio::test]
async fn arguments_are_converted_structurally() {
    let code = r#"verify({ n: 1.5, s: "hi", list: [true, null, [2]], nested: { ok: false } })"#;
    assert_eq!(
        value(code).await,
        Some(HostValue::from(json!({
            "n": 1.5,
            "s": "hi",
            "list": [true, null, [2]],
            "nested": {"ok": false}
        })))
    );
}

#[tokio::test]
async fn conversion_is_total() {
    let recorder = Rc::new(Recorder::default());
    let code = r#"
        const cyclic = { name: "loop" };
        cyclic.self = cyclic;
        function named() {}
        const revoked = Proxy.revocable([], {});
        revoked.revoke();
        const trapped = new Proxy([1, 2], { get() { throw 1; } });
        verify(undefined, Symbol("tag"), 10n, named, () => 1, new RangeError("bad"), cyclic, [1, , 3],
            revoked.proxy, trapped);
    "#;
    Sandbox::new(QuickJs::new())
        .execute(code, recorder.clone())
        .await
        .unwrap();

    let seen = recorder.seen.borrow();
    let args = &seen[0];
    assert_eq!(args.len(), 10);
    assert_eq!(args[0], HostValue::Undefined);
    assert_eq!(args[1], HostValue::from("Symbol(tag)"));
    assert_eq!(args[2], HostValue::from("10"));
    assert_eq!(args[3], HostValue::Function { name: "named".into() });
    assert!(matches!(args[4], HostValue::Function { .. }));
    assert_eq!(args[5].get("name"), Some(&HostValue::from("RangeError")));
    assert_eq!(args[5].get("message"), Some(&HostValue::from("bad")));
    assert_eq!(args[6].get("name"), Some(&HostValue::from("loop")));
    assert_eq!(args[6].get("self"), Some(&HostValue::from("[Circular]")));
    assert_eq!(
        args[7],
        HostValue::Array(vec![
            HostValue::Number(1.0),
            HostValue::Undefined,
            HostValue::Number(3.0)
        ])
    );
    // proxies whose length cannot be read fall back to text
    assert!(matches!(args[8], HostValue::String(_)), "{:?}", args[8]);
    assert!(matches!(args[9], HostValue::String(_)), "{:?}", args[9]);
}

#[tokio::test]
async fn to_json_is_honored() {
    assert_eq!(
        value("verify(new Date(0))").await,
        Some(HostValue::from("1970-01-01T00:00:00.000Z"))
    );
    let code = r#"
        class Money { constructor(c) { this.cents = c; } toJSON() { return { amount: this.cents / 100 }; } }
        verify({ when: new Date(0), price: new Money(250) })
    "#;
    assert_eq!(
        value(code).await,
        Some(HostValue::from(json!({
            "when": "1970-01-01T00:00:00.000Z",
            "price": {"amount": 2.5}
        })))
    );
}

#[tokio::test]
async fn deep_values_are_truncated_not_circular() {
    let code = "let v = { leaf: true }; for (let i = 0; i < 200; i++) v = { o: v }; verify(v)";
    let mut current = value(code).await.unwrap();
    let mut depth = 0;
    while let Some(next) = current.get("o") {
        current = next.clone();
        depth += 1;
    }
    assert_eq!(current, HostValue::from("[Too deep]"));
    assert!(depth < 200);
}

#[tokio::test]
async fn shared_references_are_not_circular() {
    let code = "const leaf = [1]; verify({ a: leaf, b: leaf })";
    assert_eq!(value(code).await, Some(HostValue::from(json!({"a": [1], "b": [1]}))));
}

#[tokio::test]
async fn bridge_echoes_first_argument() {
    let code = r#"
        const original = { id: 3 };
        const echoed = verify(original, "ignored");
        verify(echoed === original && verify() === undefined);
    "#;
    assert_eq!(value(code).await, Some(HostValue::Bool(true)));
}

#[tokio::test]
async fn deferred_host_verification_is_awaited() {
    let captured = Sandbox::new(QuickJs::new())
        .execute("verify('slow')", Rc::new(deferred_identity))
        .await
        .unwrap();
    assert_eq!(captured.value, Some(HostValue::from("slow")));
}

#[tokio::test]
async fn deferred_host_verification_from_guest_promise() {
    let captured = Sandbox::new(QuickJs::new())
        .execute(
            "Promise.resolve(5).then(v => verify(v * 2))",
            Rc::new(deferred_identity),
        )
        .await
        .unwrap();
    assert_eq!(captured.value, Some(HostValue::Number(10.0)));
}

#[tokio::test]
async fn deferred_calls_keep_last_write_wins() {
    let verifier = |args: Vec<HostValue>| {
        let first = args.into_iter().next().unwrap_or(HostValue::Undefined);
        // the first call settles last
        let delay = match first.as_number() {
            Some(n) if n == 1.0 => 30,
            _ => 1,
        };
        Verdict::deferred(async move {
            tokio::time::sleep(Duration::from_millis(delay)).await;
            Ok(first)
        })
    };
    let captured = Sandbox::new(QuickJs::new())
        .execute("verify(1); verify(2)", Rc::new(verifier))
        .await
        .unwrap();
    assert_eq!(captured.value, Some(HostValue::Number(2.0)));
    assert_eq!(captured.calls, 2);
}

#[tokio::test]
async fn rejected_host_future_is_no_value_and_does_not_fail() {
    let verifier = |_args: Vec<HostValue>| {
        Verdict::deferred(async { Err(VerificationError::failed("rejected")) })
    };
    let captured = Sandbox::new(QuickJs::new())
        .execute("verify(1)", Rc::new(verifier))
        .await
        .unwrap();
    assert_eq!(captured.value, None);
    assert_eq!(captured.failures, 1);
}

#[tokio::test]
async fn contexts_are_isolated() {
    let sandbox = Sandbox::new(QuickJs::new());
    sandbox
        .execute("globalThis.leaked = 1; verify(leaked)", Rc::new(Identity))
        .await
        .unwrap();
    let captured = sandbox
        .execute("verify(typeof leaked)", Rc::new(Identity))
        .await
        .unwrap();
    assert_eq!(captured.value, Some(HostValue::from("undefined")));
}

#[tokio::test]
async fn custom_bridge_name() {
    let sandbox = Sandbox::new(QuickJs::new()).with_bridge_name("check");
    let captured = sandbox
        .execute("check(typeof verify)", Rc::new(Identity))
        .await
        .unwrap();
    assert_eq!(captured.value, Some(HostValue::from("undefined")));
}

#[tokio::test]
async fn no_context_or_handle_outlives_execute() {
    let sandbox = Sandbox::new(QuickJs::new());
    let verifier: Rc<dyn Verifier> = Rc::new(Identity);

    sandbox.execute("verify(1)", verifier.clone()).await.unwrap();
    sandbox.execute("verify(1); throw 0", verifier.clone()).await.unwrap_err();
    sandbox.execute("verify(", verifier.clone()).await.unwrap_err();
    sandbox
        .execute("Promise.resolve().then(() => verify(2))", verifier.clone())
        .await
        .unwrap();

    assert_eq!(sandbox.engine().ledger().live(), 0);
    assert_eq!(sandbox.engine().ledger().acquired(), 4);
    // the bridge function and everything it captured are gone
    assert_eq!(Rc::strong_count(&verifier), 1);
}

#[tokio::test]
async fn runaway_guest_hits_the_deadline() {
    let limits = Limits {
        timeout: Some(Duration::from_millis(50)),
        memory_limit: None,
    };
    let sandbox = Sandbox::new(QuickJs::with_limits(limits));
    let err = sandbox
        .execute("while (true) {}", Rc::new(Identity))
        .await
        .unwrap_err();
    assert!(matches!(err, SandboxError::Timeout(_)), "{:?}", err);
    assert_eq!(sandbox.engine().ledger().live(), 0);
}

#[tokio::test]
async fn runaway_promise_loop_hits_the_deadline() {
    let limits = Limits {
        timeout: Some(Duration::from_millis(50)),
        memory_limit: None,
    };
    let code = "function spin() { return Promise.resolve().then(spin); } spin();";
    let err = Sandbox::new(QuickJs::with_limits(limits))
        .execute(code, Rc::new(Identity))
        .await
        .unwrap_err();
    assert!(matches!(err, SandboxError::Timeout(_)), "{:?}", err);
}

#[tokio::test]
async fn failing_deferred_task_does_not_stop_draining() {
    let code = r#"
        Promise.resolve().then(() => { throw new Error("ignored"); });
        Promise.resolve(3).then(verify);
    "#;
    assert_eq!(value(code).await, Some(HostValue::Number(3.0)));
}

#[tokio::test]
async fn out_of_memory_in_deferred_task_does_not_stop_draining() {
    let limits = Limits {
        timeout: None,
        memory_limit: Some(8 * 1024 * 1024),
    };
    let sandbox = Sandbox::new(QuickJs::with_limits(limits));
    let code = r#"
        Promise.resolve().then(() => {
            const hog = [];
            while (true) hog.push(new Array(4096).fill(hog.length));
        });
        Promise.resolve(3).then(verify);
    "#;
    let captured = sandbox.execute(code, Rc::new(Identity)).await.unwrap();
    assert_eq!(captured.value, Some(HostValue::Number(3.0)));
    assert_eq!(sandbox.engine().ledger().live(), 0);
}

#[tokio::test]
async fn timed_out_block_does_not_affect_the_next() {
    let limits = Limits {
        timeout: Some(Duration::from_millis(50)),
        memory_limit: None,
    };
    let sandbox = Sandbox::new(QuickJs::with_limits(limits));
    let err = sandbox
        .execute("Promise.resolve().then(() => { while (true) {} })", Rc::new(Identity))
        .await
        .unwrap_err();
    assert!(matches!(err, SandboxError::Timeout(_)), "{:?}", err);

    let captured = sandbox.execute("verify(1)", Rc::new(Identity)).await.unwrap();
    assert_eq!(captured.value, Some(HostValue::Number(1.0)));
    assert_eq!(sandbox.engine().ledger().live(), 0);
    assert_eq!(sandbox.engine().ledger().acquired(), 2);
}
