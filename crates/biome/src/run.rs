use crate::{Biome, BiomeError, Context, Invocation};

/// Run `argv` in the package directory, capturing combined output.
///
/// On failure the captured output is appended to the error so that callers
/// can report what the command printed.
pub fn run_command<B>(ctx: &Context, bio: &B, argv: &[&str]) -> Result<(), BiomeError>
where
    B: Biome + ?Sized,
{
    let mut output = Vec::new();
    let result = bio.run(
        ctx,
        Invocation::new(argv.iter().copied()).combined_output(&mut output),
    );
    match result {
        Ok(()) => Ok(()),
        Err(err) => {
            let text = String::from_utf8_lossy(&output).trim_end().to_string();
            if text.is_empty() {
                Err(err)
            } else {
                Err(BiomeError::Command {
                    source: Box::new(err),
                    output: text,
                })
            }
        }
    }
}
