use veil_functions::FunctionCatalog;

fn main() {
    let catalog = FunctionCatalog::with_builtins();
    for signature in catalog.signatures() {
        println!("{signature}");
    }
}
