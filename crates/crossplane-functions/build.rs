fn main() {
    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile(
            &["proto/apiextensions/fn/v1/run_function.proto"],
            &["proto"],
        )
        .expect("failed to compile run_function.proto");
}
