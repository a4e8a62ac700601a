use crate::common::{single_target, Fixture};

fn package(fixture: &Fixture, name: &str, version: &str, license: &str) {
    fixture
        .write(
            &format!("node_modules/{}/package.json", name),
            &format!(
                r#"{{ "name": "{}", "version": "{}", "license": "{}", "main": "index.js", "author": {{ "name": "{} authors" }} }}"#,
                name, version, license, name
            ),
        )
        .write(
            &format!("node_modules/{}/index.js", name),
            &format!("export function {}() {{ return '{}'; }}\n", name.replace('-', "_"), name),
        );
}

#[tokio::test]
async fn test_license_report_lists_bundled_packages_in_order() {
    let fixture = Fixture::new();
    fixture
        .write("package.json", r#"{ "name": "demo", "version": "1.0.0", "license": "MIT" }"#)
        .write("LICENSE", "Copyright demo authors")
        .write(
            "src/main.ts",
            "import { zeta } from 'zeta';\nimport { alpha } from 'alpha';\nimport { never_used } from 'never-used';\nexport const both = zeta() + alpha();\n",
        );
    package(&fixture, "zeta", "2.0.0", "MIT");
    package(&fixture, "alpha", "1.4.0", "ISC");
    package(&fixture, "never-used", "9.9.9", "GPL-3.0");
    fixture
        .write("node_modules/zeta/LICENSE", "MIT License\n\nCopyright zeta")
        .write("node_modules/alpha/LICENCE.txt", "ISC License");

    let report = fixture
        .build(&single_target(
            r#""input": { "main": "src/main.ts" },
               "output": [{ "dir": "dist" }],
               "license_dir": "reports/node""#,
        ))
        .await;
    assert!(report.succeeded(), "{:?}", report.targets);
    assert_eq!(
        report.target("node").unwrap().license_file.as_deref(),
        Some(fixture.root().join("reports/node/LICENSE.md").as_path())
    );

    let license = fixture.read("reports/node/LICENSE.md");
    assert!(license.starts_with("# demo core license\ndemo is released under the MIT license:\n\nCopyright demo authors\n"));
    assert!(license.contains("following licenses:\nISC, MIT\n"));
    assert!(license.contains("## alpha\nLicense: ISC\nBy: alpha authors\n\n> ISC License"));
    assert!(license.contains("## zeta\nLicense: MIT\nBy: zeta authors\n\n> MIT License\n>\n> Copyright zeta"));
    assert!(license.find("## alpha").unwrap() < license.find("## zeta").unwrap());
    assert!(!license.contains("never-used"));
    assert!(!license.contains("## demo"));
}

#[tokio::test]
async fn test_license_report_is_not_written_for_failed_targets() {
    let fixture = Fixture::new();
    fixture
        .write("src/main.ts", "import './broken';\nimport { zeta } from 'zeta';\nexport const z = zeta;\n")
        .write("src/broken.ts", "this.value = 1;\nexport const b = 1;\n");
    package(&fixture, "zeta", "2.0.0", "MIT");

    let report = fixture
        .build(&single_target(
            r#""input": { "main": "src/main.ts" },
               "output": [{ "dir": "dist" }],
               "license_dir": "reports/node""#,
        ))
        .await;

    assert_eq!(report.exit_code(), 1);
    assert_eq!(report.target("node").unwrap().diagnostics[0].code, "THIS_IS_UNDEFINED");
    assert!(!fixture.exists("reports"));
    assert!(!fixture.exists("dist"));
}

const PER_TARGET_PACKAGES: &str = r#"{
    "schedule": "sequential",
    "base": { "output": [{ "dir": "dist" }] },
    "targets": [
        { "name": "node", "input": { "main": "src/node.ts" }, "output": [{ "dir": "dist/node" }] LICENSE_NODE },
        { "name": "browser", "input": { "main": "src/browser.ts" }, "output": [{ "dir": "dist/browser" }] LICENSE_BROWSER }
    ]
}"#;

fn per_target_project() -> Fixture {
    let fixture = Fixture::new();
    fixture
        .write("package.json", r#"{ "name": "demo", "version": "1.0.0", "license": "MIT" }"#)
        .write("src/node.ts", "import { aaa } from 'aaa';\nexport const n = aaa();\n")
        .write("src/browser.ts", "import { bbb } from 'bbb';\nexport const b = bbb();\n");
    package(&fixture, "aaa", "1.0.0", "MIT");
    package(&fixture, "bbb", "1.0.0", "Apache-2.0");
    fixture
}

#[tokio::test]
async fn test_each_target_keeps_its_own_license_report() {
    let fixture = per_target_project();
    let config = PER_TARGET_PACKAGES
        .replace("LICENSE_NODE", r#", "license_dir": "dist/node""#)
        .replace("LICENSE_BROWSER", r#", "license_dir": "dist/browser""#);

    let report = fixture.build(&config).await;
    assert!(report.succeeded(), "{:?}", report.targets);

    let node = fixture.read("dist/node/LICENSE.md");
    assert!(node.contains("## aaa\nLicense: MIT"));
    assert!(!node.contains("## bbb"));
    let browser = fixture.read("dist/browser/LICENSE.md");
    assert!(browser.contains("## bbb\nLicense: Apache-2.0"));
    assert!(!browser.contains("## aaa"));
}

#[tokio::test]
async fn test_shared_default_license_dir_is_rejected() {
    let fixture = per_target_project();
    let config_json = PER_TARGET_PACKAGES
        .replace("LICENSE_NODE", "")
        .replace("LICENSE_BROWSER", "");
    let config = fixture.config(&config_json);

    let err = Fixture::driver(&config).run(&config).await.unwrap_err();
    assert!(matches!(err, tandem::BuildError::Config(ref msg) if msg.contains("license_dir")));
    assert!(!fixture.exists("LICENSE.md"));
    assert!(!fixture.exists("dist"));
}
