use crate::common::{single_target, Fixture};

fn build_options(extra: &str) -> String {
    let base = r#""input": { "main": "src/main.ts" }, "output": [{ "dir": "dist" }]"#;
    if extra.is_empty() {
        single_target(base)
    } else {
        single_target(&format!("{}, {}", base, extra))
    }
}

#[tokio::test]
async fn test_side_effects_survive_by_default() {
    let fixture = Fixture::new();
    fixture
        .write("src/main.ts", "import { used } from './lib';\nimport './polyfill';\nexport const out = used();\n")
        .write(
            "src/lib.ts",
            "export function used() { return 1; }\nexport function unusedHelper() { return 2; }\nconsole.log('lib loaded');\n",
        )
        .write("src/polyfill.ts", "(globalThis as any).installed = true;\n");

    let report = fixture.build(&build_options("")).await;
    assert!(report.succeeded(), "{:?}", report.targets);

    let main = fixture.read("dist/main.js");
    assert!(main.contains("function used()"));
    assert!(main.contains("lib loaded"));
    assert!(main.contains("installed = true"));
    assert!(!main.contains("unusedHelper"));
}

#[tokio::test]
async fn test_property_reads_follow_the_option() {
    let fixture = Fixture::new();
    fixture
        .write("src/main.ts", "import { flag } from './env';\nexport const enabled = flag;\n")
        .write("src/env.ts", "export const flag = true;\nconst agent = globalThis.navigator;\n");

    assert!(fixture.build(&build_options("")).await.succeeded());
    assert!(fixture.read("dist/main.js").contains("globalThis.navigator"));

    let unsound = build_options(r#""treeshake": { "property_read_side_effects": false }"#);
    assert!(fixture.build(&unsound).await.succeeded());
    assert!(!fixture.read("dist/main.js").contains("navigator"));
}

#[tokio::test]
async fn test_side_effect_free_modules_are_dropped() {
    let fixture = Fixture::new();
    fixture
        .write("src/main.ts", "import './register';\nimport { value } from './value';\nexport const v = value;\n")
        .write("src/register.ts", "console.log('register');\nexport const registered = 1;\n")
        .write("src/value.ts", "export const value = 7;\n");

    let pure = build_options(r#""treeshake": { "pure_modules": ["src/register.ts"] }"#);
    assert!(fixture.build(&pure).await.succeeded());
    let main = fixture.read("dist/main.js");
    assert!(!main.contains("register"));
    assert!(main.contains("7"));

    let no_effects = build_options(r#""treeshake": { "module_side_effects": false }"#);
    assert!(fixture.build(&no_effects).await.succeeded());
    assert!(!fixture.read("dist/main.js").contains("register"));
}

#[tokio::test]
async fn test_shared_and_manual_chunks() {
    let fixture = Fixture::new();
    fixture
        .write("src/a.ts", "import { shared } from './shared';\nimport { heavy } from './heavy';\nexport const a = shared + heavy;\n")
        .write("src/b.ts", "import { shared } from './shared';\nexport const b = shared * 2;\n")
        .write("src/shared.ts", "export const shared = 21;\n")
        .write("src/heavy.ts", "export const heavy = 1000;\n");

    let report = fixture
        .build(&single_target(
            r#""input": { "a": "src/a.ts", "b": "src/b.ts" },
               "manual_chunks": { "vendor": ["src/heavy.ts"] },
               "output": [{ "dir": "dist" }]"#,
        ))
        .await;
    assert!(report.succeeded(), "{:?}", report.targets);

    let a = fixture.read("dist/a.js");
    assert!(a.contains("./module-shared.js"));
    assert!(a.contains("./module-vendor.js"));
    assert!(fixture.read("dist/b.js").contains("./module-shared.js"));
    assert!(fixture.read("dist/module-shared.js").contains("21"));
    assert!(fixture.read("dist/module-vendor.js").contains("1000"));
}
