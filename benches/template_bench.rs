//! Quick benchmark to verify expression resolution performance

use std::time::Instant;

use provisio::{Resolver, Resource, ResourceGraph};

fn main() {
    let mut graph = ResourceGraph::new();
    let sql = graph
        .add(
            Resource::bicep("sql", "sql.bicep")
                .with_connection_string("Server=tcp:{sql.outputs.fqdn},1433;Password={sql.secretOutputs.pwd}"),
        )
        .unwrap();
    graph
        .add(
            Resource::bicep("db", "db.bicep")
                .with_parent("sql")
                .with_connection_string("{sql.connectionString};Database=db"),
        )
        .unwrap();
    graph.add(Resource::parameter("region", "westeurope")).unwrap();
    sql.set_output("fqdn", "sql-x1.database.windows.net");
    sql.set_secret_output("pwd", "bench-password");

    let templates = vec![
        "Simple text with no placeholders",
        "Host={sql.outputs.fqdn}",
        "{sql.outputs.fqdn};{sql.secretOutputs.pwd};{region.value}",
        "{db.connectionString}",
        "{{escaped}} {sql.outputs.fqdn} {{braces}} {region.value}",
    ];

    let resolver = Resolver::new(&graph);

    println!("Expression Resolution Performance Test");
    println!("======================================\n");

    // Warm up the template cache
    for template in &templates {
        let _ = resolver.resolve_template("bench", template);
    }

    for template in &templates {
        let iterations = 100_000;
        let start = Instant::now();

        for _ in 0..iterations {
            let _ = resolver.resolve_template("bench", template);
        }

        let elapsed = start.elapsed();
        println!("Template: {:60}", format!("\"{}\"", template));
        println!("  Time for {} iterations: {:?}", iterations, elapsed);
        println!("  Per operation: {:?}\n", elapsed / iterations);
    }

    println!("Graph Layering Performance");
    println!("==========================\n");

    let mut wide = ResourceGraph::new();
    for i in 0..200 {
        let mut r = Resource::bicep(&format!("r{}", i), "r.bicep");
        if i > 0 {
            r = r.with_parameter("prev", provisio::Value::output(format!("r{}", i - 1), "id"));
        }
        wide.add(r).unwrap();
    }

    let iterations = 1_000;
    let start = Instant::now();
    for _ in 0..iterations {
        let _ = wide.layers();
    }
    let elapsed = start.elapsed();
    println!("200-resource chain: {:?} per layering", elapsed / iterations);
}
