//! Rule-project assembly.
//!
//! A buildable rule project is a Maven KJar: a `pom.xml` with kjar
//! packaging, a `kmodule.xml` module descriptor, the rule source under
//! `src/main/resources/rules/`, and one generated Java fact class per
//! `declare … end` block found in the rule source. The generated classes
//! give the rule server concrete fact types to bind incoming JSON against.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use rulegrid_core::{ReleaseId, RULESET_GROUP_ID};

/// Rule-engine release the generated project builds against.
const ENGINE_BOM_VERSION: &str = "7.74.1.Final";

/// One fact type declared in the rule source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FactType {
    pub name: String,
    /// (field name, Java type) pairs in declaration order.
    pub fields: Vec<(String, String)>,
}

impl FactType {
    /// Fully qualified class name of the generated fact.
    pub fn qualified_name(&self) -> String {
        format!("{RULESET_GROUP_ID}.{}", self.name)
    }
}

static DECLARE_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)declare\s+([A-Za-z_]\w*)\s*(.*?)\bend\b").unwrap()
});
static FIELD_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*([A-Za-z_]\w*)\s*:\s*([\w.]+)").unwrap()
});

/// Extract fact-type declarations from rule source.
pub fn parse_fact_types(rule_source: &str) -> Vec<FactType> {
    let mut facts = Vec::new();
    for block in DECLARE_BLOCK.captures_iter(rule_source) {
        let name = block[1].to_string();
        let body = &block[2];
        let fields = FIELD_LINE
            .captures_iter(body)
            .map(|f| (f[1].to_string(), f[2].to_string()))
            .collect();
        debug!(fact = %name, "fact type declared in rule source");
        facts.push(FactType { name, fields });
    }
    facts
}

/// Render the Java source for one generated fact class.
pub fn render_fact_class(fact: &FactType) -> String {
    let mut out = String::new();
    out.push_str(&format!("package {RULESET_GROUP_ID};\n\n"));
    out.push_str("import java.io.Serializable;\n\n");
    out.push_str(&format!(
        "public class {} implements Serializable {{\n\n",
        fact.name
    ));
    out.push_str("    private static final long serialVersionUID = 1L;\n\n");
    for (name, ty) in &fact.fields {
        out.push_str(&format!("    private {ty} {name};\n"));
    }
    out.push_str(&format!("\n    public {}() {{\n    }}\n", fact.name));
    for (name, ty) in &fact.fields {
        let upper = capitalize(name);
        out.push_str(&format!(
            "\n    public {ty} get{upper}() {{\n        return {name};\n    }}\n"
        ));
        out.push_str(&format!(
            "\n    public void set{upper}({ty} {name}) {{\n        this.{name} = {name};\n    }}\n"
        ));
    }
    out.push_str("}\n");
    out
}

/// Render the Maven build descriptor for a ruleset release.
pub fn render_pom(release: &ReleaseId) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<project xmlns="http://maven.apache.org/POM/4.0.0"
         xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"
         xsi:schemaLocation="http://maven.apache.org/POM/4.0.0 http://maven.apache.org/xsd/maven-4.0.0.xsd">
  <modelVersion>4.0.0</modelVersion>

  <groupId>{group}</groupId>
  <artifactId>{artifact}</artifactId>
  <version>{version}</version>
  <packaging>kjar</packaging>

  <properties>
    <project.build.sourceEncoding>UTF-8</project.build.sourceEncoding>
    <maven.compiler.source>11</maven.compiler.source>
    <maven.compiler.target>11</maven.compiler.target>
  </properties>

  <dependencies>
    <dependency>
      <groupId>org.drools</groupId>
      <artifactId>drools-core</artifactId>
      <version>{engine}</version>
      <scope>provided</scope>
    </dependency>
    <dependency>
      <groupId>org.drools</groupId>
      <artifactId>drools-compiler</artifactId>
      <version>{engine}</version>
      <scope>provided</scope>
    </dependency>
  </dependencies>

  <build>
    <plugins>
      <plugin>
        <groupId>org.kie</groupId>
        <artifactId>kie-maven-plugin</artifactId>
        <version>{engine}</version>
        <extensions>true</extensions>
      </plugin>
    </plugins>
  </build>
</project>
"#,
        group = release.group_id,
        artifact = release.artifact_id,
        version = release.version,
        engine = ENGINE_BOM_VERSION,
    )
}

/// Render the module descriptor. The default (stateful, single session)
/// configuration is all the generated projects need.
pub fn render_kmodule() -> String {
    r#"<?xml version="1.0" encoding="UTF-8"?>
<kmodule xmlns="http://www.drools.org/xsd/kmodule"/>
"#
    .to_string()
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RULE_SOURCE: &str = r#"
package com.underwriting;

declare Applicant
    creditScore : int
    income : double
    name : String
end

declare Decision
    approved : boolean
    reason : String
end

rule "minimum credit score"
when
    $a : Applicant(creditScore < 620)
then
    insert(new Decision(false, "credit score below floor"));
end
"#;

    #[test]
    fn parses_all_declare_blocks() {
        let facts = parse_fact_types(RULE_SOURCE);
        assert_eq!(facts.len(), 2);
        assert_eq!(facts[0].name, "Applicant");
        assert_eq!(
            facts[0].fields,
            vec![
                ("creditScore".to_string(), "int".to_string()),
                ("income".to_string(), "double".to_string()),
                ("name".to_string(), "String".to_string()),
            ]
        );
        assert_eq!(facts[1].name, "Decision");
        assert_eq!(facts[1].qualified_name(), "com.underwriting.Decision");
    }

    #[test]
    fn rule_bodies_do_not_produce_facts() {
        let facts = parse_fact_types("rule \"x\"\nwhen\nthen\nend\n");
        assert!(facts.is_empty());
    }

    #[test]
    fn handles_qualified_field_types() {
        let facts = parse_fact_types(
            "declare Loan\n    amount : java.math.BigDecimal\nend\n",
        );
        assert_eq!(facts[0].fields[0].1, "java.math.BigDecimal");
    }

    #[test]
    fn fact_class_has_accessors() {
        let fact = FactType {
            name: "Applicant".into(),
            fields: vec![("creditScore".into(), "int".into())],
        };
        let java = render_fact_class(&fact);
        assert!(java.contains("package com.underwriting;"));
        assert!(java.contains("public class Applicant implements Serializable"));
        assert!(java.contains("private int creditScore;"));
        assert!(java.contains("public int getCreditScore()"));
        assert!(java.contains("public void setCreditScore(int creditScore)"));
    }

    #[test]
    fn pom_carries_release_coordinates() {
        let release = ReleaseId {
            group_id: "com.underwriting".into(),
            artifact_id: "chase-auto-underwriting-rules".into(),
            version: "1.0.3".into(),
        };
        let pom = render_pom(&release);
        assert!(pom.contains("<groupId>com.underwriting</groupId>"));
        assert!(pom.contains("<artifactId>chase-auto-underwriting-rules</artifactId>"));
        assert!(pom.contains("<version>1.0.3</version>"));
        assert!(pom.contains("<packaging>kjar</packaging>"));
        assert!(pom.contains("kie-maven-plugin"));
    }

    #[test]
    fn kmodule_is_valid_default_descriptor() {
        assert!(render_kmodule().contains("http://www.drools.org/xsd/kmodule"));
    }
}
