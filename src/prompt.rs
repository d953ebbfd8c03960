use std::io::{self, BufRead, Write};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Consent {
    Yes,
    No,
}

const QUESTION: &str =
    "Do you have a web camera, and give permission for it to be used?\n1. Yes\n2. No\n";

/// Ask until the answer is 1 (yes) or 2 (no). End of input counts as no.
pub fn ask_consent<R: BufRead, W: Write>(input: &mut R, output: &mut W) -> io::Result<Consent> {
    let mut line = String::new();
    loop {
        output.write_all(QUESTION.as_bytes())?;
        output.flush()?;

        line.clear();
        if input.read_line(&mut line)? == 0 {
            return Ok(Consent::No);
        }

        match line.trim().parse::<i64>() {
            Ok(1) => return Ok(Consent::Yes),
            Ok(2) => return Ok(Consent::No),
            Ok(_) => writeln!(output, "Invalid input, try again.")?,
            Err(_) => writeln!(output, "Try again with an integer (1 for yes, 2 for no).")?,
        }
    }
}
