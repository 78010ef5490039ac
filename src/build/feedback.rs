use colored::*;

pub struct FeedbackAnalyzer;

impl FeedbackAnalyzer {
    /// Suggest a fix for a failed compiler or linker run, based on its output.
    pub fn analyze(output: &str) -> Option<String> {
        // 1. Main function missing (Specific Linker Error)
        if output.contains("undefined reference to `main'")
            || output.contains("undefined reference to 'main'")
            || output.contains("entry point must be defined")
            || output.contains("\"_main\", referenced from")
        {
            return Some(format!(
                "Your project is missing a {} function.\nEnsure you have a valid entry point or set {} in {} if this is a library.",
                "main()".bold().yellow(),
                "type: static library".bold().green(),
                "[target]".bold().yellow()
            ));
        }

        // 2. Generic Missing Library (Linker Error)
        if output.contains("LNK2019")
            || output.contains("undefined reference to")
            || output.contains("Undefined symbols for architecture")
            || output.contains("cannot find -l")
        {
            return Some(format!(
                "It looks like a {} error.\nYou might be missing a library in the {} list of {} in pyruvic.projinfo.",
                "Linker".bold().red(),
                "libs".bold().yellow(),
                "[requirements]".bold().yellow()
            ));
        }

        // 3. Missing Header (Compiler Error)
        if output.contains("fatal error: ") && output.contains("No such file or directory")
            || output.contains("file not found")
            || output.contains("cannot open include file")
        {
            return Some(format!(
                "It looks like a {} error.\nYou might be missing an include path or a dependency.\nCheck {} and {} in pyruvic.projinfo.",
                "Missing Header".bold().red(),
                "[dependencies]".bold().yellow(),
                "include-dir".bold().yellow()
            ));
        }

        None
    }
}
