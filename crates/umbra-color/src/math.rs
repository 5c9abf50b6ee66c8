//! Scalar and matrix helpers shared by the color pipeline.

/// Linearly maps `x` from `[in_low, in_high]` to `[out_low, out_high]`.
///
/// Inputs outside the source range extrapolate rather than clamp; callers
/// that need clamping pair this with [`clamp`].
pub fn scale(x: f64, in_low: f64, in_high: f64, out_low: f64, out_high: f64) -> f64 {
    (x - in_low) * (out_high - out_low) / (in_high - in_low) + out_low
}

pub fn clamp(x: f64, min: f64, max: f64) -> f64 {
    max.min(min.max(x))
}

/// Row-by-column product of two 5x5 matrices.
pub fn multiply_matrices(m1: &[[f64; 5]; 5], m2: &[[f64; 5]; 5]) -> [[f64; 5]; 5] {
    let mut result = [[0.0; 5]; 5];
    for (i, row) in result.iter_mut().enumerate() {
        for (j, cell) in row.iter_mut().enumerate() {
            let mut sum = 0.0;
            for (k, m2_row) in m2.iter().enumerate() {
                sum += m1[i][k] * m2_row[j];
            }
            *cell = sum;
        }
    }
    result
}

/// Evaluates an infix arithmetic expression (`+ - * /`, no parentheses).
///
/// Runs the shunting-yard algorithm to build a reverse polish stack, then
/// folds it. Returns `None` when the expression leaves the stack in a
/// state that is not a single number.
pub fn evaluate_math(expression: &str) -> Option<f64> {
    fn precedence(token: &str) -> Option<u8> {
        match token {
            "+" | "-" => Some(1),
            "*" | "/" => Some(2),
            _ => None,
        }
    }

    let mut rpn: Vec<String> = Vec::new();
    let mut operators: Vec<String> = Vec::new();
    let mut last_was_operator = true;

    for token in expression.chars() {
        if token == ' ' {
            continue;
        }
        if let Some(op) = precedence(&token.to_string()) {
            while let Some(top) = operators.last() {
                match precedence(top) {
                    Some(top_op) if op <= top_op => rpn.push(operators.pop().unwrap()),
                    _ => break,
                }
            }
            operators.push(token.to_string());
            last_was_operator = true;
        } else if last_was_operator {
            rpn.push(token.to_string());
            last_was_operator = false;
        } else {
            rpn.last_mut().unwrap().push(token);
            last_was_operator = false;
        }
    }
    while let Some(op) = operators.pop() {
        rpn.push(op);
    }

    let mut stack: Vec<f64> = Vec::new();
    for token in &rpn {
        if precedence(token).is_some() {
            let right = stack.pop()?;
            let left = stack.pop()?;
            stack.push(match token.as_str() {
                "+" => left + right,
                "-" => left - right,
                "*" => left * right,
                _ => left / right,
            });
        } else {
            stack.push(token.parse().ok()?);
        }
    }

    if stack.len() == 1 {
        Some(stack[0])
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ===== scale / clamp =====

    #[test]
    fn test_scale_maps_ranges() {
        assert_eq!(scale(0.5, 0.0, 1.0, 0.0, 100.0), 50.0);
        assert_eq!(scale(0.25, 0.0, 0.5, 0.0, 0.4), 0.2);
        // Extrapolates outside the input range.
        assert_eq!(scale(2.0, 0.0, 1.0, 0.0, 10.0), 20.0);
    }

    #[test]
    fn test_clamp() {
        assert_eq!(clamp(300.0, 0.0, 255.0), 255.0);
        assert_eq!(clamp(-4.0, 0.0, 255.0), 0.0);
        assert_eq!(clamp(128.0, 0.0, 255.0), 128.0);
    }

    // ===== matrix multiply =====

    #[test]
    fn test_identity_multiplication() {
        let mut identity = [[0.0; 5]; 5];
        for (i, row) in identity.iter_mut().enumerate() {
            row[i] = 1.0;
        }
        let m = [
            [1.0, 2.0, 3.0, 4.0, 5.0],
            [5.0, 4.0, 3.0, 2.0, 1.0],
            [0.0, 1.0, 0.0, 1.0, 0.0],
            [2.0, 2.0, 2.0, 2.0, 2.0],
            [1.0, 0.0, 0.0, 0.0, 1.0],
        ];
        assert_eq!(multiply_matrices(&identity, &m), m);
        assert_eq!(multiply_matrices(&m, &identity), m);
    }

    // ===== expression evaluation =====

    #[test]
    fn test_evaluate_math_precedence() {
        assert_eq!(evaluate_math("1 + 2 * 3"), Some(7.0));
        assert_eq!(evaluate_math("16 / 4 - 1"), Some(3.0));
        assert_eq!(evaluate_math("2 * 3 + 4 * 5"), Some(26.0));
    }

    #[test]
    fn test_evaluate_math_single_number() {
        assert_eq!(evaluate_math("42"), Some(42.0));
        assert_eq!(evaluate_math("3.5"), Some(3.5));
    }

    #[test]
    fn test_evaluate_math_rejects_garbage() {
        assert_eq!(evaluate_math("1 +"), None);
        assert_eq!(evaluate_math("banana"), None);
    }
}
