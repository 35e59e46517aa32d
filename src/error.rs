use std::fmt::Display;

#[derive(Debug)]
pub enum FeldsparError {
    Input(String),
    Script(String),
    Solver(String),
    Parse(String),
}

impl Display for FeldsparError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (err_name, value) = match self {
            FeldsparError::Input(v) => ("Input", v),
            FeldsparError::Script(v) => ("Script", v),
            FeldsparError::Solver(v) => ("Solver", v),
            FeldsparError::Parse(v) => ("Parse", v),
        };

        write!(f, "{} error: {}", err_name, value)
    }
}
