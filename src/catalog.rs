//! Built-in challenge catalog
//!
//! Read-only lookup of the coding challenge behind each category: the starter
//! template loaded into the shared editor, the graded test cases, and the covert
//! sabotage tasks handed to the saboteur.

use crate::types::{Category, TaskId};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct TestCase {
    pub name: String,
    pub test_code: String,
    pub expected_output: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SabotageTask {
    pub id: TaskId,
    pub description: String,
    /// Regular expression matched against the whole shared code
    pub pattern: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Challenge {
    pub category: Category,
    /// Judge0-style language id (71 = Python 3, 63 = JavaScript)
    pub language_id: u32,
    pub starter_code: String,
    pub test_cases: Vec<TestCase>,
    pub sabotage_tasks: Vec<SabotageTask>,
}

#[derive(Debug, Clone)]
pub struct ChallengeCatalog {
    challenges: Vec<Challenge>,
}

impl ChallengeCatalog {
    pub fn new(challenges: Vec<Challenge>) -> Self {
        Self { challenges }
    }

    /// Catalog with one challenge per category
    pub fn builtin() -> Self {
        Self::new(vec![
            dsa_challenge(),
            oop_challenge(),
            security_challenge(),
            frontend_challenge(),
            backend_challenge(),
        ])
    }

    pub fn challenge(&self, category: Category) -> Option<&Challenge> {
        self.challenges.iter().find(|c| c.category == category)
    }

    pub fn starter_code(&self, category: Category) -> &str {
        self.challenge(category)
            .map(|c| c.starter_code.as_str())
            .unwrap_or_default()
    }

    pub fn categories(&self) -> Vec<Category> {
        self.challenges.iter().map(|c| c.category).collect()
    }
}

impl Default for ChallengeCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

fn test_case(name: &str, test_code: &str, expected_output: &str) -> TestCase {
    TestCase {
        name: name.to_string(),
        test_code: test_code.to_string(),
        expected_output: expected_output.to_string(),
    }
}

fn task(id: &str, description: &str, pattern: &str) -> SabotageTask {
    SabotageTask {
        id: id.to_string(),
        description: description.to_string(),
        pattern: pattern.to_string(),
    }
}

fn dsa_challenge() -> Challenge {
    Challenge {
        category: Category::Dsa,
        language_id: 71,
        starter_code: r#"def binary_search(arr, target):
    """Return the index of target in the sorted list arr, or -1."""
    low, high = 0, len(arr) - 1
    while low <= high:
        mid = (low + high) // 2
        # TODO: compare arr[mid] with target and move low/high
        pass
    return -1
"#
        .to_string(),
        test_cases: vec![
            test_case(
                "finds middle",
                "print(binary_search([1,2,3,4,5], 3))",
                "2\n",
            ),
            test_case(
                "not found",
                "print(binary_search([1,2,3,4,5], 8))",
                "-1\n",
            ),
        ],
        sabotage_tasks: vec![
            task(
                "dsa-exclusive-loop",
                "Make the loop condition `low < high` so the last element is skipped",
                r"while\s+low\s*<\s*high\s*:",
            ),
            task(
                "dsa-none-sentinel",
                "Return None instead of -1 when the target is missing",
                r"return\s+None\b",
            ),
            task(
                "dsa-float-mid",
                "Compute mid with `/` instead of `//`",
                r"\(\s*low\s*\+\s*high\s*\)\s*/\s*2",
            ),
        ],
    }
}

fn oop_challenge() -> Challenge {
    Challenge {
        category: Category::Oop,
        language_id: 71,
        starter_code: r#"class VendingMachine:
    def __init__(self):
        self.inventory = {}

    def add_item(self, name, price, quantity):
        # TODO: store price and quantity for name
        pass

    def purchase(self, name, paid):
        # TODO: return change, decrement stock
        pass
"#
        .to_string(),
        test_cases: vec![
            test_case(
                "add item",
                "vm = VendingMachine()\nvm.add_item('soda', 1.5, 2)\nprint(len(vm.inventory))",
                "1\n",
            ),
            test_case(
                "purchase",
                "vm = VendingMachine()\nvm.add_item('soda', 1.5, 1)\nprint(vm.purchase('soda', 2.0))",
                "0.5\n",
            ),
        ],
        sabotage_tasks: vec![
            task(
                "oop-list-inventory",
                "Store the inventory in a list instead of a dict",
                r"self\.inventory\s*=\s*\[\s*\]",
            ),
            task(
                "oop-return-price",
                "Return the price instead of the change",
                r"return\s+price\b",
            ),
            task(
                "oop-debug-print",
                "Leave a debug print inside purchase",
                r#"print\(\s*["']debug"#,
            ),
        ],
    }
}

fn security_challenge() -> Challenge {
    Challenge {
        category: Category::Security,
        language_id: 71,
        starter_code: r#"def login_user(username, password, db):
    cursor = db.cursor()
    # TODO: look the user up safely
    return cursor.fetchone()
"#
        .to_string(),
        test_cases: vec![test_case(
            "uses parameters",
            "class FakeCursor:\n    def __init__(self):\n        self.query = None\n        self.params = None\n    def execute(self, q, p=None):\n        self.query = q\n        self.params = p\n    def fetchone(self):\n        return 'ok'\n\nclass FakeDB:\n    def cursor(self):\n        return FakeCursor()\n\ndb = FakeDB()\nuser = login_user('a', \"' OR 1=1 --\", db)\nprint(user)",
            "ok\n",
        )],
        sabotage_tasks: vec![
            task(
                "sec-fstring-query",
                "Build the SQL query with an f-string",
                r#"f["']SELECT"#,
            ),
            task(
                "sec-concat-password",
                "Concatenate the password straight into the query",
                r"\+\s*password\b",
            ),
            task(
                "sec-log-password",
                "Print the plaintext password",
                r"print\(.*password",
            ),
        ],
    }
}

fn frontend_challenge() -> Challenge {
    Challenge {
        category: Category::Frontend,
        language_id: 63,
        starter_code: r#"function Counter() {
  const [count, setCount] = useState(0);
  // TODO: render the count with + and - buttons
  return null;
}
"#
        .to_string(),
        test_cases: vec![test_case(
            "component defined",
            "console.log(typeof Counter === 'function')",
            "true\n",
        )],
        sabotage_tasks: vec![
            task(
                "fe-start-at-100",
                "Initialize the counter at 100",
                r"useState\(100\)",
            ),
            task(
                "fe-inverted-increment",
                "Make the + button subtract",
                r"setCount\(\s*count\s*-\s*1\s*\)",
            ),
            task(
                "fe-marquee",
                "Render the count inside a <marquee>",
                r"<marquee",
            ),
        ],
    }
}

fn backend_challenge() -> Challenge {
    Challenge {
        category: Category::Backend,
        language_id: 71,
        starter_code: r#"users = {}

def register(username, password):
    # TODO: reject duplicates, hash the password, store the user
    pass
"#
        .to_string(),
        test_cases: vec![test_case(
            "register exists",
            "print(register.__name__)",
            "register\n",
        )],
        sabotage_tasks: vec![
            task(
                "be-plaintext-password",
                "Store the password in plain text",
                r#"["']password["']\s*:\s*password\b"#,
            ),
            task(
                "be-admin-backdoor",
                "Hardcode an admin backdoor",
                r#"==\s*["']admin["']"#,
            ),
            task(
                "be-swallow-errors",
                "Swallow every exception with a bare except",
                r"except\s*:",
            ),
        ],
    }
}
