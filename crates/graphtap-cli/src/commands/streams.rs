use graphtap_engine::catalog;

/// Execute the `streams` command: print the stream catalog.
pub fn execute() {
    println!(
        "{:32} {:12} {:12} {}",
        "STREAM", "MODE", "PARENT", "REPLICATION KEY"
    );
    for def in catalog::all_streams() {
        let mode = if def.is_incremental() {
            "incremental"
        } else {
            "full-refresh"
        };
        println!(
            "{:32} {:12} {:12} {}",
            def.name,
            mode,
            def.parent.unwrap_or("-"),
            def.replication_key.unwrap_or("-"),
        );
    }
}
