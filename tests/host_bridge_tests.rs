use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use funcscript::runtime::error::{self, EvalError};
use funcscript::runtime::host::HostBridge;
use funcscript::runtime::value::Value;
use funcscript::runtime::vm::Vm;

#[test]
fn missing_capability_fails_with_capability_unavailable() {
    let mut vm = Vm::new();
    for source in [
        "file('missing.txt')",
        "fileexists('x')",
        "isfile('x')",
        "dirlist('d')",
    ] {
        let err = vm.eval(source).unwrap_err();
        assert_eq!(
            err.code,
            error::CAPABILITY_UNAVAILABLE.code,
            "for {}",
            source
        );
    }
}

#[test]
fn partial_capability_table_is_valid() {
    let mut vm = Vm::new();
    vm.set_host_bridge(HostBridge {
        file_exists: Some(Arc::new(|_| Ok(true))),
        ..HostBridge::default()
    });

    assert_eq!(vm.eval("fileexists('x')").unwrap(), Value::Bool(true));
    let err = vm.eval("file('x')").unwrap_err();
    assert_eq!(err.code, error::CAPABILITY_UNAVAILABLE.code);
}

#[test]
fn host_reported_errors_propagate_verbatim() {
    let mut vm = Vm::new();
    vm.set_host_bridge(HostBridge {
        file_read_text: Some(Arc::new(|path| {
            Err(EvalError::host(404, format!("not found: {path}")))
        })),
        ..HostBridge::default()
    });

    let err = vm.eval("file('missing.txt')").unwrap_err();
    assert_eq!(err.code, 404);
    assert_eq!(err.message, "not found: missing.txt");
    assert_eq!((err.line, err.column), (-1, -1));
}

#[test]
fn failed_host_call_leaves_vm_usable() {
    let mut vm = Vm::new();
    assert!(vm.eval("file('x')").is_err());
    assert_eq!(vm.eval("1 + 1").unwrap(), Value::Int(2));
}

#[test]
fn log_line_reaches_the_host_and_never_fails() {
    let captured: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&captured);

    let mut vm = Vm::new();
    vm.set_host_bridge(HostBridge {
        log_line: Some(Arc::new(move |text: &str| {
            sink.lock().unwrap().push(text.to_string());
        })),
        ..HostBridge::default()
    });

    assert_eq!(vm.eval("log('hello')").unwrap(), Value::Nil);
    assert_eq!(vm.eval("log(42)").unwrap(), Value::Nil);
    assert_eq!(
        captured.lock().unwrap().as_slice(),
        ["hello".to_string(), "42".to_string()]
    );

    // Without the capability the call is a silent no-op.
    vm.set_host_bridge(HostBridge::default());
    assert_eq!(vm.eval("log('dropped')").unwrap(), Value::Nil);
}

#[test]
fn reinstalling_the_bridge_replaces_the_previous_one() {
    let mut vm = Vm::new();
    vm.set_host_bridge(HostBridge {
        file_exists: Some(Arc::new(|_| Ok(true))),
        ..HostBridge::default()
    });
    assert_eq!(vm.eval("fileexists('x')").unwrap(), Value::Bool(true));

    vm.set_host_bridge(HostBridge {
        file_exists: Some(Arc::new(|_| Ok(false))),
        ..HostBridge::default()
    });
    assert_eq!(vm.eval("fileexists('x')").unwrap(), Value::Bool(false));
}

#[test]
fn std_fs_bridge_round_trip() {
    let base: PathBuf = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("target")
        .join("host_bridge_test_tmp");
    let _ = std::fs::remove_dir_all(&base);
    std::fs::create_dir_all(&base).unwrap();

    let file_path = base.join("a.txt");
    std::fs::write(&file_path, "hello").unwrap();
    let dir_path = base.join("d");
    std::fs::create_dir_all(&dir_path).unwrap();

    let base_s = base.to_string_lossy().to_string();
    let file_s = file_path.to_string_lossy().to_string();
    let dir_s = dir_path.to_string_lossy().to_string();

    let mut vm = Vm::new();
    vm.set_host_bridge(HostBridge::std_fs());

    assert_eq!(
        vm.eval(&format!("file('{file_s}')")).unwrap(),
        Value::string("hello")
    );
    assert_eq!(
        vm.eval(&format!("fileexists('{file_s}')")).unwrap(),
        Value::Bool(true)
    );
    assert_eq!(
        vm.eval(&format!("isfile('{file_s}')")).unwrap(),
        Value::Bool(true)
    );
    assert_eq!(
        vm.eval(&format!("isfile('{dir_s}')")).unwrap(),
        Value::Bool(false)
    );
    assert_eq!(
        vm.eval(&format!("Len(dirlist('{base_s}'))")).unwrap(),
        Value::Int(2)
    );

    let err = vm.eval("file('definitely/not/here.txt')").unwrap_err();
    assert_eq!(err.code, error::HOST_FILE_READ.code);
}

#[test]
fn host_results_are_first_class_values() {
    let mut vm = Vm::new();
    vm.set_host_bridge(HostBridge {
        dir_list: Some(Arc::new(|_| {
            Ok(vec!["a.txt".to_string(), "b.txt".to_string()])
        })),
        ..HostBridge::default()
    });

    assert_eq!(vm.eval("dirlist('d')[1]").unwrap(), Value::string("b.txt"));
    assert_eq!(
        vm.eval_to_json("dirlist('d')").unwrap(),
        r#"["a.txt","b.txt"]"#
    );
}
